use time::{Duration, OffsetDateTime};

/// Time source for the breaker, injectable so state transitions can be tested
/// without sleeping.
pub trait Clock: Send + Sync {
	fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
	Closed,
	Open { since: OffsetDateTime },
	HalfOpen,
}

/// Provider circuit breaker. Consecutive failures open the circuit; after the
/// cooldown a single probe call is allowed, and its outcome decides whether the
/// circuit closes again or re-opens.
#[derive(Debug)]
pub struct CircuitBreaker {
	failure_threshold: u32,
	cooldown: Duration,
	consecutive_failures: u32,
	state: State,
}

impl CircuitBreaker {
	pub fn new(cfg: &keel_config::Worker) -> Self {
		Self {
			failure_threshold: cfg.breaker_failure_threshold.max(1),
			cooldown: Duration::milliseconds(cfg.breaker_cooldown_ms as i64),
			consecutive_failures: 0,
			state: State::Closed,
		}
	}

	/// Whether the next provider call may go out. Moves Open to HalfOpen once the
	/// cooldown has elapsed.
	pub fn allows(&mut self, clock: &impl Clock) -> bool {
		match self.state {
			State::Closed | State::HalfOpen => true,
			State::Open { since } =>
				if clock.now() - since >= self.cooldown {
					self.state = State::HalfOpen;

					true
				} else {
					false
				},
		}
	}

	pub fn record_success(&mut self) {
		if self.state == State::HalfOpen {
			tracing::info!("Provider circuit closed after successful probe.");
		}

		self.consecutive_failures = 0;
		self.state = State::Closed;
	}

	pub fn record_failure(&mut self, clock: &impl Clock) {
		self.consecutive_failures += 1;

		let open = match self.state {
			// A failed probe re-opens immediately.
			State::HalfOpen => true,
			State::Closed => self.consecutive_failures >= self.failure_threshold,
			State::Open { .. } => false,
		};

		if open {
			tracing::warn!(
				consecutive_failures = self.consecutive_failures,
				cooldown_ms = self.cooldown.whole_milliseconds() as i64,
				"Provider circuit opened."
			);

			self.state = State::Open { since: clock.now() };
		}
	}

	pub fn is_open(&self) -> bool {
		matches!(self.state, State::Open { .. })
	}
}
