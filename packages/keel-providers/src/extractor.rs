use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use keel_domain::ModelEntity;

use crate::{Error, Result};

const EXTRACTOR_SYSTEM_PROMPT: &str = "\
You label maintenance-record queries. Return strict JSON of the form \
{\"entities\": [{\"entity_type\": \"equipment|fault_code|symptom|measurement|part|work_order\", \
\"text\": \"<surface text>\", \"confidence\": <0.0-1.0>}]}. \
Only label text that is present in the query. Return {\"entities\": []} when unsure.";

/// Client for the model-assisted extraction fallback. Only consulted in the GPT lane
/// when the pattern pass came up empty or low-confidence; the caller bounds the call
/// and degrades to pattern-only results on failure.
#[derive(Debug, Clone)]
pub struct ExtractorClient {
	client: Client,
	cfg: keel_config::LlmProviderConfig,
}

impl ExtractorClient {
	pub fn new(cfg: &keel_config::LlmProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, cfg: cfg.clone() })
	}

	pub async fn extract_entities(&self, query: &str) -> Result<Vec<ModelEntity>> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"messages": [
				{ "role": "system", "content": EXTRACTOR_SYSTEM_PROMPT },
				{ "role": "user", "content": query },
			],
		});
		let res = self
			.client
			.post(url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_extractor_response(json)
	}
}

fn parse_extractor_response(json: Value) -> Result<Vec<ModelEntity>> {
	let payload = if let Some(content) = json
		.get("choices")
		.and_then(|value| value.as_array())
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(|content| content.as_str())
	{
		serde_json::from_str::<Value>(content).map_err(|_| Error::InvalidResponse {
			message: "Extractor content is not valid JSON.".to_string(),
		})?
	} else if json.is_object() {
		json
	} else {
		return Err(Error::InvalidResponse {
			message: "Extractor response is missing JSON content.".to_string(),
		});
	};
	let entities = payload.get("entities").cloned().unwrap_or(Value::Array(Vec::new()));

	serde_json::from_value(entities).map_err(|_| Error::InvalidResponse {
		message: "Extractor entities have an unexpected shape.".to_string(),
	})
}
