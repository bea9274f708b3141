mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Classifier, Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers, Ranking,
	Relations, Security, Service, Storage, TierWeights, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, timeout) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("llm_extractor", cfg.providers.llm_extractor.timeout_ms),
	] {
		if timeout == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("llm_extractor", &cfg.providers.llm_extractor.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.classifier.rules_version.trim().is_empty() {
		return Err(Error::Validation {
			message: "classifier.rules_version must be non-empty.".to_string(),
		});
	}
	if cfg.classifier.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "classifier.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.classifier.paste_dump_max_lines == 0 {
		return Err(Error::Validation {
			message: "classifier.paste_dump_max_lines must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.classifier.low_confidence_threshold) {
		return Err(Error::Validation {
			message: "classifier.low_confidence_threshold must be in the range 0.0-1.0."
				.to_string(),
		});
	}

	if cfg.relations.group_limit == 0 {
		return Err(Error::Validation {
			message: "relations.group_limit must be greater than zero.".to_string(),
		});
	}

	let tiers = &cfg.relations.tier_weights;

	for (label, weight) in [
		("direct_link", tiers.direct_link),
		("same_parent", tiers.same_parent),
		("same_category", tiers.same_category),
	] {
		if !weight.is_finite() || weight <= 0.0 {
			return Err(Error::Validation {
				message: format!(
					"relations.tier_weights.{label} must be a positive finite number."
				),
			});
		}
	}

	if !cfg.ranking.max_alpha.is_finite() || !(0.0..=1.0).contains(&cfg.ranking.max_alpha) {
		return Err(Error::Validation {
			message: "ranking.max_alpha must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !cfg.ranking.blend_alpha.is_finite()
		|| cfg.ranking.blend_alpha < 0.0
		|| cfg.ranking.blend_alpha > cfg.ranking.max_alpha
	{
		return Err(Error::Validation {
			message: "ranking.blend_alpha must be in the range 0.0-ranking.max_alpha."
				.to_string(),
		});
	}

	// Tier dominance: a cosine contribution bounded by 100 * max_alpha must never lift
	// an item across a tier boundary.
	let max_blend = 100.0 * cfg.ranking.max_alpha;

	if tiers.direct_link - tiers.same_parent <= max_blend
		|| tiers.same_parent - tiers.same_category <= max_blend
	{
		return Err(Error::Validation {
			message: format!(
				"relations.tier_weights gaps must exceed 100 x ranking.max_alpha ({max_blend})."
			),
		});
	}

	if cfg.ranking.shadow_top_n == 0 {
		return Err(Error::Validation {
			message: "ranking.shadow_top_n must be greater than zero.".to_string(),
		});
	}

	if cfg.worker.batch_limit == 0 {
		return Err(Error::Validation {
			message: "worker.batch_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.run_budget_ms == 0 {
		return Err(Error::Validation {
			message: "worker.run_budget_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.provider_concurrency == 0 {
		return Err(Error::Validation {
			message: "worker.provider_concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.retry_max_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.retry_max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.retry_base_ms == 0 {
		return Err(Error::Validation {
			message: "worker.retry_base_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.breaker_failure_threshold == 0 {
		return Err(Error::Validation {
			message: "worker.breaker_failure_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.breaker_cooldown_ms == 0 {
		return Err(Error::Validation {
			message: "worker.breaker_cooldown_ms must be greater than zero.".to_string(),
		});
	}
	if !cfg.worker.cost_per_million_tokens.is_finite() || cfg.worker.cost_per_million_tokens < 0.0
	{
		return Err(Error::Validation {
			message: "worker.cost_per_million_tokens must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	normalize_terms(&mut cfg.classifier.extra_drift_terms);
	normalize_terms(&mut cfg.classifier.extra_injection_phrases);
}

fn normalize_terms(terms: &mut Vec<String>) {
	for term in terms.iter_mut() {
		*term = term.trim().to_lowercase();
	}

	terms.retain(|term| !term.is_empty());
	terms.sort();
	terms.dedup();
}
