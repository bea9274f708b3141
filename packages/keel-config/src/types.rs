use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub classifier: Classifier,
	pub relations: Relations,
	pub ranking: Ranking,
	pub worker: Worker,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm_extractor: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

/// Classifier rule knobs. The built-in rule lists live in `keel-domain`; the entries
/// here extend them so the drift vocabulary can be tuned without a release.
#[derive(Debug, Deserialize)]
pub struct Classifier {
	pub rules_version: String,
	pub max_query_chars: u32,
	pub paste_dump_max_lines: u32,
	#[serde(default)]
	pub extra_drift_terms: Vec<String>,
	#[serde(default)]
	pub extra_injection_phrases: Vec<String>,
	/// Pattern hits below this confidence trigger the model-assisted pass in GPT lane.
	pub low_confidence_threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct Relations {
	pub group_limit: u32,
	pub tier_weights: TierWeights,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierWeights {
	pub direct_link: f32,
	pub same_parent: f32,
	pub same_category: f32,
}

#[derive(Debug, Deserialize)]
pub struct Ranking {
	/// Blend weight applied on the shadow path. The response path ignores it entirely
	/// while it is zero.
	pub blend_alpha: f32,
	/// Upper bound any deployment may set `blend_alpha` to. Tier dominance is
	/// validated against this bound, not the current alpha.
	pub max_alpha: f32,
	pub shadow_enabled: bool,
	pub shadow_top_n: u32,
}

#[derive(Debug, Deserialize)]
pub struct Worker {
	pub batch_limit: u32,
	pub run_budget_ms: u64,
	pub poll_interval_ms: u64,
	pub provider_concurrency: u32,
	pub retry_max_attempts: u32,
	pub retry_base_ms: u64,
	pub breaker_failure_threshold: u32,
	pub breaker_cooldown_ms: u64,
	pub cost_per_million_tokens: f64,
	#[serde(default)]
	pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}
