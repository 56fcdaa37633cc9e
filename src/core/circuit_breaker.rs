use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this no longer count towards the threshold.
    pub failure_window: Duration,
    /// Time spent open before trial calls are let through.
    pub cool_down: Duration,
    /// Trial calls permitted at once while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    /// Bumped every time the circuit opens; trial permits carry the value
    /// they were granted under.
    generation: u64,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            trials_in_flight: 0,
            generation: 0,
        }
    }
}

/// Failure-isolation state machine guarding one downstream resource.
///
/// Closed counts consecutive failures inside a rolling window. Reaching the
/// threshold opens the circuit; while open every call is refused. After the
/// cool-down a limited number of trial calls run in half-open state: one
/// success closes the circuit, one failure opens it again.
pub struct CircuitBreaker {
    resource: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

/// Permission for one call, returned by [`CircuitBreaker::allow_call`].
///
/// Dropping a permit without reporting an outcome (the call was cancelled or
/// panicked) counts as a failure.
#[must_use = "report the call outcome through the permit"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(resource = %self.breaker.resource, "Call abandoned without an outcome, counting it as failed");
            self.breaker.on_failure(self.trial);
        }
    }
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            resource: resource.into(),
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    // counters are only ever written whole; poisoning is harmless
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, reporting an expired open circuit as half-open.
    pub fn state(&self) -> CircuitState {
        let state = self.lock();
        match (state.state, state.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if opened_at.elapsed() >= self.config.cool_down =>
            {
                CircuitState::HalfOpen
            }
            (current, _) => current,
        }
    }

    /// Asks for permission to call the resource. `None` means the call must
    /// not be made.
    pub fn allow_call(&self) -> Option<CallPermit<'_>> {
        let mut state = self.lock();
        let trial = match state.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if !cooled_down {
                    return None;
                }
                state.state = CircuitState::HalfOpen;
                state.trials_in_flight = 1;
                tracing::info!(resource = %self.resource, "Circuit breaker half-open, allowing trial call");
                Some(state.generation)
            }
            CircuitState::HalfOpen => {
                if state.trials_in_flight >= self.config.half_open_max_calls {
                    return None;
                }
                state.trials_in_flight += 1;
                Some(state.generation)
            }
        };

        Some(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn is_current_trial(state: &BreakerState, trial: Option<u64>) -> bool {
        state.state == CircuitState::HalfOpen && trial == Some(state.generation)
    }

    fn on_success(&self, trial: Option<u64>) {
        let mut state = self.lock();
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.last_failure_at = None;
            }
            CircuitState::HalfOpen if Self::is_current_trial(&state, trial) => {
                tracing::info!(resource = %self.resource, "Circuit breaker closed after successful trial");
                let generation = state.generation;
                *state = BreakerState {
                    generation,
                    ..BreakerState::default()
                };
            }
            // late results of calls admitted before the circuit opened
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, trial: Option<u64>) {
        let mut state = self.lock();
        let now = Instant::now();

        match state.state {
            CircuitState::HalfOpen if Self::is_current_trial(&state, trial) => {
                tracing::warn!(resource = %self.resource, "Trial call failed, circuit breaker re-opened");
                Self::open(&mut state, now);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
            CircuitState::Closed => {
                let window_expired = state
                    .last_failure_at
                    .map(|last| now.duration_since(last) > self.config.failure_window)
                    .unwrap_or(false);
                if window_expired {
                    state.consecutive_failures = 0;
                }

                state.consecutive_failures += 1;
                state.last_failure_at = Some(now);

                if state.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        resource = %self.resource,
                        failures = state.consecutive_failures,
                        "Circuit breaker opened"
                    );
                    Self::open(&mut state, now);
                }
            }
        }
    }

    fn open(state: &mut BreakerState, now: Instant) {
        state.state = CircuitState::Open;
        state.opened_at = Some(now);
        state.last_failure_at = Some(now);
        state.trials_in_flight = 0;
        state.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "catalog",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_failure_window(Duration::from_secs(60))
                .with_cool_down(Duration::from_secs(30)),
        )
    }

    fn fail(cb: &CircuitBreaker) {
        cb.allow_call().unwrap().record_failure();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let cb = breaker(3);

        fail(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_call().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3);

        fail(&cb);
        fail(&cb);
        cb.allow_call().unwrap().record_success();
        fail(&cb);
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_accumulate() {
        let cb = breaker(2);

        fail(&cb);
        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let cb = breaker(1);
        fail(&cb);
        assert!(cb.allow_call().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let trial = cb.allow_call().unwrap();
        assert!(trial.is_trial());
        // only one trial at a time
        assert!(cb.allow_call().is_none());

        trial.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let cb = breaker(1);
        fail(&cb);

        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_call().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.allow_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_open_circuit() {
        let cb = breaker(1);
        let slow = cb.allow_call().unwrap();
        let failing = cb.allow_call().unwrap();

        failing.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        slow.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_call().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_call_cannot_settle_half_open_trial() {
        let cb = breaker(1);
        let slow = cb.allow_call().unwrap();
        fail(&cb);

        tokio::time::advance(Duration::from_secs(30)).await;
        let trial = cb.allow_call().unwrap();

        // admitted while closed; neither outcome decides the trial
        slow.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_call().is_none());

        trial.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_reopens_instead_of_wedging() {
        let cb = breaker(1);
        fail(&cb);
        tokio::time::advance(Duration::from_secs(30)).await;

        let cancelled = tokio::time::timeout(Duration::from_millis(100), async {
            let _trial = cb.allow_call().unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .await;
        assert!(cancelled.is_err());

        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(30)).await;
        cb.allow_call().unwrap().record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_trial_reopens_instead_of_wedging() {
        let cb = Arc::new(breaker(1));
        fail(&cb);
        tokio::time::advance(Duration::from_secs(30)).await;

        let worker = Arc::clone(&cb);
        let crashed = tokio::spawn(async move {
            let _trial = worker.allow_call().unwrap();
            panic!("store driver crashed");
        })
        .await;
        assert!(crashed.unwrap_err().is_panic());

        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.allow_call().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_open_exactly_once() {
        let cb = Arc::new(breaker(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                tokio::spawn(async move {
                    let permit = cb.allow_call();
                    tokio::task::yield_now().await;
                    if let Some(permit) = permit {
                        permit.record_failure();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.lock().consecutive_failures, 8);
        assert_eq!(cb.lock().generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_half_open_admissions_respect_limit() {
        let cb = Arc::new(CircuitBreaker::new(
            "catalog",
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_cool_down(Duration::from_secs(30))
                .with_half_open_max_calls(2),
        ));
        fail(&cb);
        tokio::time::advance(Duration::from_secs(30)).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        let workers: Vec<_> = (0..10)
            .map(|_| {
                let cb = Arc::clone(&cb);
                let tx = tx.clone();
                let release = Arc::clone(&release);
                tokio::spawn(async move {
                    let permit = cb.allow_call();
                    let _ = tx.send(permit.is_some());
                    drop(tx);
                    if let Some(permit) = permit {
                        let _go = release.acquire().await.unwrap();
                        permit.record_success();
                    }
                })
            })
            .collect();
        drop(tx);

        let mut admitted = 0;
        while let Some(granted) = rx.recv().await {
            if granted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 2);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        release.add_permits(2);
        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
