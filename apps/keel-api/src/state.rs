use std::sync::Arc;

use keel_domain::ClassifierRules;
use keel_providers::ExtractorClient;
use keel_service::capability::CapabilityRegistry;
use keel_storage::{Db, EntityStore};

/// Shared request-path state. Generic over the store so the HTTP suite can run
/// against the in-memory one.
pub struct AppState<S> {
	pub config: Arc<keel_config::Config>,
	pub rules: Arc<ClassifierRules>,
	pub registry: Arc<CapabilityRegistry>,
	pub store: Arc<S>,
	pub extractor: Option<Arc<ExtractorClient>>,
}

impl<S> Clone for AppState<S> {
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			rules: self.rules.clone(),
			registry: self.registry.clone(),
			store: self.store.clone(),
			extractor: self.extractor.clone(),
		}
	}
}

impl<S: EntityStore> AppState<S> {
	pub fn with_store(
		config: keel_config::Config,
		store: S,
		extractor: Option<ExtractorClient>,
	) -> color_eyre::Result<Self> {
		let rules = ClassifierRules::new(&config.classifier);
		let registry = CapabilityRegistry::builtin()?;

		Ok(Self {
			config: Arc::new(config),
			rules: Arc::new(rules),
			registry: Arc::new(registry),
			store: Arc::new(store),
			extractor: extractor.map(Arc::new),
		})
	}
}

impl AppState<Db> {
	pub async fn new(config: keel_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let extractor = ExtractorClient::new(&config.providers.llm_extractor)?;

		Self::with_store(config, db, Some(extractor))
	}
}
