use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Client for an OpenAI-compatible embedding endpoint. Built once at startup; the
/// timeout comes from config and bounds every call.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
	client: Client,
	cfg: keel_config::EmbeddingProviderConfig,
}

impl EmbeddingClient {
	pub fn new(cfg: &keel_config::EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, cfg: cfg.clone() })
	}

	pub fn dimensions(&self) -> u32 {
		self.cfg.dimensions
	}

	/// Embed a batch of normalized texts. Vectors come back in input order and are
	/// checked against the configured dimension count.
	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": texts,
			"dimensions": self.cfg.dimensions,
		});
		let res = self
			.client
			.post(url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != texts.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Provider returned {} vectors for {} inputs.",
					vectors.len(),
					texts.len()
				),
			});
		}

		for vector in &vectors {
			if vector.len() != self.cfg.dimensions as usize {
				return Err(Error::InvalidResponse {
					message: format!(
						"Vector dimension {} does not match configured dimensions {}.",
						vector.len(),
						self.cfg.dimensions
					),
				});
			}
		}

		Ok(vectors)
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|value| value.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|value| value.as_u64())
			.map(|value| value as usize)
			.unwrap_or(fallback_index);
		let embedding =
			item.get("embedding").and_then(|value| value.as_array()).ok_or_else(|| {
				Error::InvalidResponse {
					message: "Embedding item missing embedding array.".to_string(),
				}
			})?;
		let mut vector = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vector.push(number as f32);
		}

		indexed.push((index, vector));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
