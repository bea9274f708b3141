use std::{sync::Arc, time::Duration as StdDuration};

use time::Duration;
use tokio::task::JoinSet;

use keel_domain::embed_text;
use keel_providers::EmbeddingClient;
use keel_storage::{EmbeddingSource, EntityStore};

use crate::{
	Result,
	breaker::{CircuitBreaker, Clock},
};

const MAX_PARK_ERROR_CHARS: usize = 512;

/// Provider failure classified at the seam, so retry policy never has to inspect
/// transport details.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
	/// Worth retrying with backoff: timeouts, connection failures, throttling.
	#[error("{0}")]
	Transient(String),
	/// Retrying cannot help: malformed responses, dimension mismatches, bad config.
	#[error("{0}")]
	Permanent(String),
}

impl From<keel_providers::Error> for BackendError {
	fn from(err: keel_providers::Error) -> Self {
		if err.is_transient() {
			Self::Transient(err.to_string())
		} else {
			Self::Permanent(err.to_string())
		}
	}
}

/// Seam over the embedding provider, one input at a time.
pub trait EmbeddingBackend: Send + Sync {
	fn embed(
		&self,
		input: &str,
	) -> impl Future<Output = std::result::Result<Vec<f32>, BackendError>> + Send;
}

impl EmbeddingBackend for EmbeddingClient {
	async fn embed(&self, input: &str) -> std::result::Result<Vec<f32>, BackendError> {
		let mut vectors = EmbeddingClient::embed(self, &[input.to_string()]).await?;

		vectors.pop().ok_or_else(|| {
			BackendError::Permanent("Provider returned no vector for the input.".to_string())
		})
	}
}

/// Exponential backoff schedule for transient failures: base, 2x, 4x, ...
pub fn backoff_for_attempt(attempt: u32, base_ms: u64) -> StdDuration {
	StdDuration::from_millis(base_ms.saturating_mul(1 << attempt.saturating_sub(1).min(16)))
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
	pub scanned: usize,
	pub refreshed: usize,
	pub parked: usize,
	/// Left stale for the next pass: budget ran out or the circuit was open.
	pub deferred: usize,
	pub dry_run: bool,
	pub estimated_tokens: u64,
	pub estimated_cost: f64,
}

enum Outcome {
	Refreshed(Vec<f32>),
	/// `provider_fault` marks parks caused by the dependency itself (transient
	/// failures that exhausted their retries); only those feed the breaker. A
	/// permanent validation error says nothing about the provider's health.
	Park { reason: String, provider_fault: bool },
}

/// One refresh pass: select stale records oldest first, embed them with bounded
/// concurrency, and write each result back atomically. A dry run stops after the
/// selection and reports the estimated provider spend without writing anything.
pub async fn run_once<S, B, C>(
	store: &S,
	backend: &Arc<B>,
	breaker: &mut CircuitBreaker,
	clock: &C,
	cfg: &keel_config::Worker,
	dry_run: bool,
) -> Result<RunReport>
where
	S: EntityStore,
	B: EmbeddingBackend + 'static,
	C: Clock,
{
	let sources = store.stale_embedding_sources(cfg.batch_limit).await?;
	let inputs: Vec<(EmbeddingSource, String)> = sources
		.into_iter()
		.map(|source| {
			let input = embed_text::build_embedding_input(source.kind.as_str(), &[
				&source.title,
				&source.body,
			]);

			(source, input)
		})
		.collect();
	let mut report = RunReport {
		scanned: inputs.len(),
		dry_run,
		estimated_tokens: inputs.iter().map(|(_, input)| input.chars().count() as u64 / 4).sum(),
		..Default::default()
	};

	report.estimated_cost =
		report.estimated_tokens as f64 / 1_000_000. * cfg.cost_per_million_tokens;

	if dry_run {
		return Ok(report);
	}

	let started = clock.now();
	let budget = Duration::milliseconds(cfg.run_budget_ms as i64);
	let concurrency = cfg.provider_concurrency.max(1) as usize;
	let mut pending = inputs.into_iter().peekable();

	while pending.peek().is_some() {
		if clock.now() - started > budget {
			tracing::info!(deferred = pending.len(), "Run budget exhausted; deferring the rest.");

			report.deferred += pending.len();

			break;
		}
		if !breaker.allows(clock) {
			tracing::warn!(deferred = pending.len(), "Provider circuit open; deferring the rest.");

			report.deferred += pending.len();

			break;
		}

		let chunk: Vec<(EmbeddingSource, String)> = pending.by_ref().take(concurrency).collect();
		let mut tasks: JoinSet<(EmbeddingSource, Outcome)> = JoinSet::new();
		let mut provider_failed = false;

		for (source, input) in chunk {
			if input.trim().is_empty() {
				// Nothing left after scrubbing. A provider call cannot fix this.
				store
					.park_embedding(
						source.kind,
						source.id,
						&source.tenant_id,
						"Empty embedding input.",
						clock.now(),
					)
					.await?;

				report.parked += 1;

				continue;
			}

			let backend = backend.clone();
			let max_attempts = cfg.retry_max_attempts.max(1);
			let base_ms = cfg.retry_base_ms;

			tasks.spawn(async move {
				let outcome = embed_with_retry(backend.as_ref(), &input, max_attempts, base_ms)
					.await;

				(source, outcome)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			let Ok((source, outcome)) = joined else {
				// A panicked task loses its source for this pass; staleness selection
				// picks the record up again next time.
				continue;
			};

			match outcome {
				Outcome::Refreshed(vector) => {
					store
						.store_embedding(
							source.kind,
							source.id,
							&source.tenant_id,
							&vector,
							clock.now(),
						)
						.await?;

					report.refreshed += 1;

					breaker.record_success();
				},
				Outcome::Park { reason, provider_fault } => {
					let sanitized = sanitize_error(&reason);

					tracing::warn!(
						kind = source.kind.as_str(),
						id = %source.id,
						error = %sanitized,
						"Embedding refresh parked a record."
					);

					store
						.park_embedding(
							source.kind,
							source.id,
							&source.tenant_id,
							&sanitized,
							clock.now(),
						)
						.await?;

					report.parked += 1;

					if provider_fault {
						provider_failed = true;
					}
				},
			}
		}

		if provider_failed {
			breaker.record_failure(clock);
		}
	}

	Ok(report)
}

async fn embed_with_retry<B: EmbeddingBackend>(
	backend: &B,
	input: &str,
	max_attempts: u32,
	base_ms: u64,
) -> Outcome {
	let mut attempt = 1;

	loop {
		match backend.embed(input).await {
			Ok(vector) => return Outcome::Refreshed(vector),
			Err(BackendError::Transient(message)) if attempt < max_attempts => {
				tracing::debug!(attempt, error = %message, "Transient provider failure; retrying.");

				tokio::time::sleep(backoff_for_attempt(attempt, base_ms)).await;

				attempt += 1;
			},
			Err(BackendError::Transient(message)) =>
				return Outcome::Park {
					reason: format!("Retries exhausted: {message}"),
					provider_fault: true,
				},
			Err(BackendError::Permanent(message)) =>
				return Outcome::Park { reason: message, provider_fault: false },
		}
	}
}

/// Park reasons end up in the database; strip anything that looks like a secret and
/// bound the length.
fn sanitize_error(message: &str) -> String {
	let mut sanitized = embed_text::scrub(message);

	sanitized.truncate(MAX_PARK_ERROR_CHARS);

	sanitized
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use time::OffsetDateTime;

	use keel_storage::RecordKind;
	use keel_testkit::{MemoryStore, seed_fleet};

	use super::*;
	use crate::breaker::SystemClock;

	struct ManualClock {
		now: Mutex<OffsetDateTime>,
		step_ms: i64,
	}

	impl ManualClock {
		fn stepping(step_ms: i64) -> Self {
			Self {
				now: Mutex::new(
					OffsetDateTime::from_unix_timestamp(1_760_000_000)
						.expect("valid timestamp"),
				),
				step_ms,
			}
		}
	}

	impl Clock for ManualClock {
		fn now(&self) -> OffsetDateTime {
			let mut now = self.now.lock().expect("clock lock");

			*now += Duration::milliseconds(self.step_ms);

			*now
		}
	}

	enum Script {
		Ok,
		Permanent,
		TransientThenOk { failures: u32 },
		AlwaysTransient,
	}

	struct StubBackend {
		script: Script,
		calls: Mutex<u32>,
	}

	impl StubBackend {
		fn new(script: Script) -> Arc<Self> {
			Arc::new(Self { script, calls: Mutex::new(0) })
		}

		fn calls(&self) -> u32 {
			*self.calls.lock().expect("calls lock")
		}
	}

	impl EmbeddingBackend for StubBackend {
		async fn embed(&self, _input: &str) -> std::result::Result<Vec<f32>, BackendError> {
			let call = {
				let mut calls = self.calls.lock().expect("calls lock");

				*calls += 1;

				*calls
			};

			match &self.script {
				Script::Ok => Ok(vec![1., 0.]),
				Script::Permanent =>
					Err(BackendError::Permanent("Vector dimension 2 does not match.".to_string())),
				Script::TransientThenOk { failures } if call <= *failures =>
					Err(BackendError::Transient("connection reset".to_string())),
				Script::TransientThenOk { .. } => Ok(vec![1., 0.]),
				Script::AlwaysTransient =>
					Err(BackendError::Transient("upstream timeout".to_string())),
			}
		}
	}

	fn worker_config() -> keel_config::Worker {
		keel_config::Worker {
			batch_limit: 16,
			run_budget_ms: 60_000,
			poll_interval_ms: 1_000,
			provider_concurrency: 2,
			retry_max_attempts: 3,
			retry_base_ms: 1_000,
			breaker_failure_threshold: 5,
			breaker_cooldown_ms: 30_000,
			cost_per_million_tokens: 0.02,
			dry_run: false,
		}
	}

	#[test]
	fn backoff_doubles_per_attempt() {
		assert_eq!(backoff_for_attempt(1, 1_000), StdDuration::from_millis(1_000));
		assert_eq!(backoff_for_attempt(2, 1_000), StdDuration::from_millis(2_000));
		assert_eq!(backoff_for_attempt(3, 1_000), StdDuration::from_millis(4_000));
	}

	#[tokio::test]
	async fn dry_run_estimates_without_writing() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let cfg = worker_config();
		let backend = StubBackend::new(Script::Ok);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, true)
			.await
			.expect("Dry run must succeed.");

		assert!(report.dry_run);
		assert!(report.scanned > 0);
		assert!(report.estimated_tokens > 0);
		assert!(report.estimated_cost > 0.);
		assert_eq!(report.refreshed, 0);
		assert_eq!(backend.calls(), 0);
		assert_eq!(store.fresh_count(), 0);
	}

	#[tokio::test]
	async fn refreshes_every_stale_record() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let cfg = worker_config();
		let backend = StubBackend::new(Script::Ok);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(report.refreshed, report.scanned);
		assert_eq!(report.parked, 0);
		assert_eq!(store.fresh_count(), report.refreshed);

		// Everything is fresh now; the next pass selects nothing.
		let next = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(next.scanned, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn transient_failures_retry_and_then_recover() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.batch_limit = 1;
		cfg.provider_concurrency = 1;

		let backend = StubBackend::new(Script::TransientThenOk { failures: 2 });
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(report.refreshed, 1);
		assert_eq!(report.parked, 0);
		assert_eq!(backend.calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_retries_park_the_record() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.batch_limit = 1;

		let backend = StubBackend::new(Script::AlwaysTransient);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(report.parked, 1);
		assert_eq!(backend.calls(), 3);
	}

	#[tokio::test]
	async fn permanent_failures_park_without_retrying() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.batch_limit = 2;
		cfg.provider_concurrency = 1;

		let backend = StubBackend::new(Script::Permanent);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(report.parked, 2);
		assert_eq!(report.refreshed, 0);
		assert_eq!(backend.calls(), 2);
	}

	#[tokio::test]
	async fn parked_records_leave_staleness_selection() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let cfg = worker_config();
		let backend = StubBackend::new(Script::Permanent);
		let mut breaker = CircuitBreaker::new(&cfg);
		let first = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert!(first.parked > 0);

		let second = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(second.scanned, 0);
	}

	#[tokio::test]
	async fn park_reasons_are_scrubbed() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.batch_limit = 1;

		struct LeakyBackend;

		impl EmbeddingBackend for LeakyBackend {
			async fn embed(
				&self,
				_input: &str,
			) -> std::result::Result<Vec<f32>, BackendError> {
				Err(BackendError::Permanent(
					"401 unauthorized for api_key=sk-verysecretvalue1234".to_string(),
				))
			}
		}

		let backend = Arc::new(LeakyBackend);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert_eq!(report.parked, 1);

		let sources = store
			.stale_embedding_sources(16)
			.await
			.expect("Stale selection must succeed.");
		// batch_limit 1 selects the oldest seeded record, so the parked record is
		// deterministically main engine 1's equipment row.
		let parked_id = uuid::Uuid::from_u128(0x11);

		assert!(sources.iter().all(|s| s.id != parked_id));

		let error = store
			.parked_error(RecordKind::Equipment, parked_id)
			.expect("parked error recorded");

		assert!(!error.contains("sk-verysecretvalue1234"), "Secrets must not be persisted.");
	}

	#[tokio::test]
	async fn open_circuit_defers_the_rest_of_the_batch() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.provider_concurrency = 1;
		cfg.retry_max_attempts = 1;
		cfg.breaker_failure_threshold = 2;

		let backend = StubBackend::new(Script::AlwaysTransient);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		// Two exhausted records open the circuit; everything else waits for the
		// cooldown.
		assert_eq!(report.parked, 2);
		assert!(report.deferred > 0);
		assert!(breaker.is_open());
	}

	#[tokio::test]
	async fn permanent_failures_never_open_the_circuit() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.provider_concurrency = 1;
		cfg.breaker_failure_threshold = 2;

		let backend = StubBackend::new(Script::Permanent);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &SystemClock, &cfg, false)
			.await
			.expect("Run must succeed.");

		// Validation errors park every record but say nothing about provider
		// health, so the whole batch still gets its chance.
		assert_eq!(report.parked, report.scanned);
		assert_eq!(report.deferred, 0);
		assert!(!breaker.is_open());
	}

	#[tokio::test]
	async fn run_budget_defers_instead_of_overrunning() {
		let store = MemoryStore::new();
		let _ids = seed_fleet(&store);
		let mut cfg = worker_config();

		cfg.provider_concurrency = 1;
		cfg.run_budget_ms = 0;

		let backend = StubBackend::new(Script::Ok);
		let clock = ManualClock::stepping(10);
		let mut breaker = CircuitBreaker::new(&cfg);
		let report = run_once(&store, &backend, &mut breaker, &clock, &cfg, false)
			.await
			.expect("Run must succeed.");

		assert!(report.deferred > 0);
		assert!(report.refreshed + report.deferred + report.parked == report.scanned);
	}
}
