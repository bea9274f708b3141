use std::{future::Future, time::Duration};

use serde::Serialize;

use keel_domain::{
	ClassifierRules, Entity, Lane, LaneDecision, ModelEntity, Patterns, classify, extract,
};
use keel_providers::ExtractorClient;

use crate::{AuthContext, Error, Result, capability::{CandidateAction, CapabilityRegistry}};

/// Seam for the model-assisted extraction fallback, so the router can be driven by a
/// stub in tests without an HTTP provider.
pub trait ModelExtractor: Send + Sync {
	fn extract_entities(
		&self,
		query: &str,
	) -> impl Future<Output = keel_providers::Result<Vec<ModelEntity>>> + Send;
}

impl ModelExtractor for ExtractorClient {
	fn extract_entities(
		&self,
		query: &str,
	) -> impl Future<Output = keel_providers::Result<Vec<ModelEntity>>> + Send {
		ExtractorClient::extract_entities(self, query)
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RouteResponse {
	pub decision: LaneDecision,
	pub entities: Vec<Entity>,
	pub candidate_actions: Vec<CandidateAction>,
	/// True when the model pass was attempted and failed; pattern results are served.
	pub extraction_degraded: bool,
}

/// The full routing pipeline: classify, extract, surface capabilities. Blocked
/// queries return the decision alone; the model pass only runs in the GPT lane,
/// bounded by the provider timeout, and degrades to pattern-only results.
pub async fn route_query<E>(
	query: &str,
	auth: &AuthContext,
	rules: &ClassifierRules,
	patterns: &Patterns,
	registry: &CapabilityRegistry,
	extractor: Option<&E>,
	cfg: &keel_config::Classifier,
	model_timeout_ms: u64,
) -> Result<RouteResponse>
where
	E: ModelExtractor,
{
	if auth.tenant_id.trim().is_empty() {
		return Err(Error::MissingTenant);
	}

	// Oversize input is a classifier concern: it blocks as a paste dump rather
	// than failing the request.
	let decision = classify(query, rules);

	tracing::info!(
		lane = ?decision.lane,
		reason = ?decision.reason,
		matched_rule = decision.matched_rule.as_deref().unwrap_or("-"),
		"Query classified."
	);

	if decision.lane == Lane::Blocked {
		return Ok(RouteResponse {
			decision,
			entities: Vec::new(),
			candidate_actions: Vec::new(),
			extraction_degraded: false,
		});
	}

	let pattern_entities = extract::extract_pattern(query, patterns);
	let mut extraction_degraded = false;
	let entities = if decision.lane == Lane::Gpt
		&& extract::needs_model_pass(&pattern_entities, cfg.low_confidence_threshold)
		&& let Some(extractor) = extractor
	{
		match tokio::time::timeout(
			Duration::from_millis(model_timeout_ms),
			extractor.extract_entities(query),
		)
		.await
		{
			Ok(Ok(model_entities)) =>
				extract::merge_entities(pattern_entities, model_entities),
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Extraction degraded to pattern-only results.");

				extraction_degraded = true;

				pattern_entities
			},
			Err(_) => {
				tracing::warn!(
					timeout_ms = model_timeout_ms,
					"Extraction timed out; degraded to pattern-only results."
				);

				extraction_degraded = true;

				pattern_entities
			},
		}
	} else {
		pattern_entities
	};
	let candidate_actions = registry.candidate_actions(&entities, decision.lane, auth);

	Ok(RouteResponse { decision, entities, candidate_actions, extraction_degraded })
}
