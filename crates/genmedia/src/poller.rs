//! Backoff-driven status polling for one long-running operation.
//!
//! [`OperationPoller`] owns the poll state of a single tracked operation.
//! [`start`](OperationPoller::start) spawns a tokio task that sleeps, calls
//! the caller's [`StatusCheck`], and either re-arms the timer or hands a
//! terminal [`PollResult`] to the caller's sink.
//!
//! Every session is stamped with a generation number. `start` and
//! [`cancel`](OperationPoller::cancel) bump the generation and trigger the
//! session's [`CancellationToken`]; the task compares its stamp under the
//! state lock before mutating anything after an await, so a superseded or
//! cancelled session can never touch state or reach its sink.

use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use imgstudio_core::polling::{
    resolve_status, Backoff, OperationStatus, PollConfig, PollPhase, PollResult, ResultPayload,
    NO_JITTER,
};
use imgstudio_core::types::OperationHandle;
use tokio_util::sync::CancellationToken;

/// Caller-supplied status check for a long-running operation.
#[async_trait]
pub trait StatusCheck: Send + Sync + 'static {
    /// Extra data passed to every check (job id, tenant, etc.).
    type Context: Send + Sync + 'static;
    /// What a finished operation yields.
    type Payload: ResultPayload + Send + 'static;
    /// Transport-level failure. Terminal for the tracked operation.
    type Error: Display + Send + 'static;

    async fn check(
        &self,
        handle: &OperationHandle,
        context: &Self::Context,
    ) -> Result<OperationStatus<Self::Payload>, Self::Error>;
}

/// Boxed result sink, invoked at most once per tracked operation.
pub type ResultSink<T> = Box<dyn FnOnce(PollResult<T>) + Send + 'static>;

struct PollState {
    generation: u64,
    phase: PollPhase,
    handle: Option<OperationHandle>,
    attempts: u32,
    backoff: Backoff,
    cancel: Option<CancellationToken>,
}

impl PollState {
    /// Stop tracking; `phase` tells whether a result was produced.
    fn clear(&mut self, phase: PollPhase) {
        self.phase = phase;
        self.handle = None;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

/// Tracks one long-running operation at a time.
///
/// Create one per operation, or reuse a single instance: a new
/// [`start`](Self::start) supersedes whatever was being tracked. Must be
/// used inside a tokio runtime.
pub struct OperationPoller<S: StatusCheck> {
    config: PollConfig,
    checker: Arc<S>,
    state: Arc<Mutex<PollState>>,
}

impl<S: StatusCheck> OperationPoller<S> {
    pub fn new(checker: Arc<S>, config: PollConfig) -> Self {
        let backoff = Backoff::new(&config);
        Self {
            config,
            checker,
            state: Arc::new(Mutex::new(PollState {
                generation: 0,
                phase: PollPhase::Idle,
                handle: None,
                attempts: 0,
                backoff,
                cancel: None,
            })),
        }
    }

    /// Begin tracking `handle`.
    ///
    /// Any previous session is cancelled before the new timer is armed and
    /// its sink will never be called. The attempt counter and interval are
    /// reset; the first check runs after `initial_interval`.
    ///
    /// The attempt cap is tested when a timer fires, before the check it
    /// would make. A timeout is therefore emitted one (jittered) interval
    /// after the last allowed check reported "not done", with
    /// `attempts == max_attempts`.
    pub fn start<F>(&self, handle: OperationHandle, context: S::Context, sink: F)
    where
        F: FnOnce(PollResult<S::Payload>) + Send + 'static,
    {
        let mut state = lock(&self.state);
        if let Some(previous) = state.cancel.take() {
            previous.cancel();
            tracing::debug!(
                superseded = ?state.handle.as_ref().map(OperationHandle::as_str),
                "Superseding tracked operation",
            );
        }

        state.generation += 1;
        state.handle = Some(handle.clone());
        state.attempts = 0;
        state.backoff.reset(&self.config);
        let first_delay = state.backoff.step(&self.config, NO_JITTER);
        state.phase = PollPhase::Scheduled;

        let token = CancellationToken::new();
        state.cancel = Some(token.clone());

        let session = Session {
            generation: state.generation,
            handle,
            context,
            cancel: token,
            config: self.config.clone(),
            checker: Arc::clone(&self.checker),
            state: Arc::clone(&self.state),
        };
        drop(state);

        tracing::info!(
            operation = %session.handle,
            delay_ms = first_delay.as_millis() as u64,
            "Tracking long-running operation",
        );
        tokio::spawn(session.run(first_delay, Box::new(sink)));
    }

    /// Stop tracking. Pending checks never run, an in-flight check's
    /// outcome is discarded, and no result is emitted. Calling it when
    /// nothing is tracked is a no-op apart from returning to `Idle`.
    ///
    /// Returns `true` when a live session was stopped, `false` when the
    /// poller was idle or had already produced its result.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        let live = matches!(state.phase, PollPhase::Scheduled | PollPhase::Checking);
        if let Some(handle) = state.handle.as_ref() {
            tracing::info!(operation = %handle, "Cancelled operation tracking");
        }
        state.generation += 1;
        state.clear(PollPhase::Idle);
        live
    }

    pub fn phase(&self) -> PollPhase {
        lock(&self.state).phase
    }

    /// Checks made in the current (or last) session.
    pub fn attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    pub fn handle(&self) -> Option<OperationHandle> {
        lock(&self.state).handle.clone()
    }

    /// Interval that the next not-done check will jitter and sleep on.
    pub fn current_interval(&self) -> Duration {
        lock(&self.state).backoff.current()
    }

    pub fn is_tracking(&self) -> bool {
        matches!(
            self.phase(),
            PollPhase::Scheduled | PollPhase::Checking
        )
    }
}

impl<S: StatusCheck> Drop for OperationPoller<S> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.clear(PollPhase::Idle);
    }
}

fn lock(state: &Mutex<PollState>) -> MutexGuard<'_, PollState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything one spawned polling task needs.
struct Session<S: StatusCheck> {
    generation: u64,
    handle: OperationHandle,
    context: S::Context,
    cancel: CancellationToken,
    config: PollConfig,
    checker: Arc<S>,
    state: Arc<Mutex<PollState>>,
}

impl<S: StatusCheck> Session<S> {
    async fn run(self, first_delay: Duration, sink: ResultSink<S::Payload>) {
        let mut delay = first_delay;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let attempt = {
                let mut state = lock(&self.state);
                if state.generation != self.generation {
                    return;
                }
                if state.attempts >= self.config.max_attempts {
                    let attempts = state.attempts;
                    state.clear(PollPhase::Terminal);
                    drop(state);
                    tracing::warn!(operation = %self.handle, attempts, "Operation polling timed out");
                    sink(PollResult::timeout(attempts));
                    return;
                }
                state.attempts += 1;
                state.phase = PollPhase::Checking;
                state.attempts
            };

            tracing::debug!(operation = %self.handle, attempt, "Checking operation status");

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return,
                outcome = self.checker.check(&self.handle, &self.context) => outcome,
            };

            let mut state = lock(&self.state);
            if state.generation != self.generation {
                return;
            }

            let result = match outcome {
                Err(e) => {
                    tracing::warn!(operation = %self.handle, attempt, error = %e, "Status check failed");
                    PollResult::transport(e.to_string())
                }
                Ok(status) => match resolve_status(status) {
                    Some(result) => result,
                    None => {
                        delay = state.backoff.step_random(&self.config);
                        state.phase = PollPhase::Scheduled;
                        tracing::debug!(
                            operation = %self.handle,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Operation still running",
                        );
                        continue;
                    }
                },
            };

            state.clear(PollPhase::Terminal);
            drop(state);
            tracing::info!(
                operation = %self.handle,
                attempt,
                outcome = result.category(),
                "Operation finished",
            );
            sink(result);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use assert_matches::assert_matches;
    use imgstudio_core::polling::FailureKind;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;

    type Status = OperationStatus<Vec<String>>;

    /// Status check driven by per-handle scripts. Unscripted calls report
    /// "not done". Every call is recorded with its offset from `origin`.
    struct Scripted {
        origin: Instant,
        scripts: Mutex<HashMap<String, VecDeque<Result<Status, String>>>>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Duration)>>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                scripts: Mutex::new(HashMap::new()),
                delays: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn script(self, handle: &str, responses: Vec<Result<Status, String>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(handle.to_string(), responses.into());
            self
        }

        /// Make checks for `handle` take `delay` before answering.
        fn slow(mut self, handle: &str, delay: Duration) -> Self {
            self.delays.insert(handle.to_string(), delay);
            self
        }

        fn calls(&self) -> Vec<(String, Duration)> {
            self.calls.lock().unwrap().clone()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StatusCheck for Scripted {
        type Context = ();
        type Payload = Vec<String>;
        type Error = String;

        async fn check(&self, handle: &OperationHandle, _context: &()) -> Result<Status, String> {
            self.calls
                .lock()
                .unwrap()
                .push((handle.to_string(), self.origin.elapsed()));
            if let Some(delay) = self.delays.get(handle.as_str()) {
                tokio::time::sleep(*delay).await;
            }
            self.scripts
                .lock()
                .unwrap()
                .get_mut(handle.as_str())
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(Status::pending()))
        }
    }

    fn sink_channel() -> (
        mpsc::UnboundedSender<PollResult<Vec<String>>>,
        mpsc::UnboundedReceiver<PollResult<Vec<String>>>,
    ) {
        mpsc::unbounded_channel()
    }

    fn to_sink(
        tx: &mpsc::UnboundedSender<PollResult<Vec<String>>>,
    ) -> impl FnOnce(PollResult<Vec<String>>) + Send + 'static {
        let tx = tx.clone();
        move |result| {
            let _ = tx.send(result);
        }
    }

    fn fast_config() -> PollConfig {
        PollConfig::default()
            .with_initial_interval(Duration::from_millis(1_000))
            .with_backoff_factor(2.0)
            .with_max_interval(Duration::from_millis(5_000))
            .with_max_attempts(3)
            .with_jitter_factor(0.0)
    }

    fn assert_near(actual: Duration, expected_ms: u64) {
        let actual_ms = actual.as_millis() as i128;
        assert!(
            (actual_ms - expected_ms as i128).abs() <= 5,
            "expected ~{expected_ms} ms, got {actual_ms} ms"
        );
    }

    /// Let every timer the poller could arm fire, then some.
    async fn drain_timers() {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_max_attempts() {
        let checker = Arc::new(Scripted::new());
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();

        assert_matches!(result, PollResult::Timeout { attempts: 3, .. });
        let calls = checker.calls();
        assert_eq!(calls.len(), 3);
        assert_near(calls[0].1, 1_000);
        assert_near(calls[1].1, 3_000);
        assert_near(calls[2].1, 7_000);

        drain_timers().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(checker.call_count(), 3);
        assert_eq!(poller.phase(), PollPhase::Terminal);
        assert_eq!(poller.handle(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_arrives_one_interval_after_last_check() {
        let checker = Arc::new(Scripted::new());
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();
        let emitted_at = checker.origin.elapsed();

        assert_matches!(result, PollResult::Timeout { attempts: 3, .. });
        // Last check at 7s, next interval clamped to 5s.
        assert_near(emitted_at, 12_000);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_backoff_factor_keeps_polling_at_max_interval() {
        let checker = Arc::new(Scripted::new());
        let config = fast_config().with_backoff_factor(1e19).with_max_attempts(4);
        let poller = OperationPoller::new(Arc::clone(&checker), config);
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        assert_eq!(poller.current_interval(), Duration::from_millis(5_000));

        let result = rx.recv().await.unwrap();
        assert_matches!(result, PollResult::Timeout { attempts: 4, .. });
        let calls = checker.calls();
        assert_near(calls[0].1, 1_000);
        assert_near(calls[1].1, 6_000);
        assert_near(calls[2].1, 11_000);
        assert_near(calls[3].1, 16_000);
    }

    #[tokio::test(start_paused = true)]
    async fn not_done_below_cap_never_emits() {
        let checker = Arc::new(Scripted::new());
        let config = fast_config().with_max_attempts(5);
        let poller = OperationPoller::new(Arc::clone(&checker), config);
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        // 1s + 2s + 4s + 5s = 12s covers four checks; the fifth is at 17s.
        tokio::time::sleep(Duration::from_millis(12_500)).await;

        assert_eq!(checker.call_count(), 4);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.phase(), PollPhase::Scheduled);
        assert_eq!(poller.attempts(), 4);
        assert!(poller.current_interval() <= Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let checker = Arc::new(
            Scripted::new().script("op-1", vec![Ok(Status::completed(vec!["video1".into()]))]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), PollConfig::default());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();

        assert_eq!(result, PollResult::Success(vec!["video1".to_string()]));
        assert_near(checker.calls()[0].1, 6_000);

        drain_timers().await;
        assert_eq!(checker.call_count(), 1);
        assert!(rx.try_recv().is_err());
        assert!(!poller.is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_on_second_attempt() {
        let checker = Arc::new(Scripted::new().script(
            "op-1",
            vec![Ok(Status::pending()), Ok(Status::failed("resource exhausted"))],
        ));
        let poller = OperationPoller::new(Arc::clone(&checker), PollConfig::default());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();

        assert_matches!(
            result,
            PollResult::Failure { kind: FailureKind::Backend, ref message }
                if message == "resource exhausted"
        );
        assert_eq!(checker.call_count(), 2);
        assert_eq!(poller.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_terminal() {
        let checker = Arc::new(
            Scripted::new().script("op-1", vec![Err("connection reset".to_string())]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();

        assert_eq!(result.category(), "transport");
        assert_eq!(result.message(), Some("connection reset"));
        drain_timers().await;
        assert_eq!(checker.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn done_without_payload_fails_with_no_results() {
        let checker = Arc::new(Scripted::new().script(
            "op-1",
            vec![Ok(Status {
                done: true,
                payload: None,
                error: None,
            })],
        ));
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        let result = rx.recv().await.unwrap();

        assert_matches!(
            result,
            PollResult::Failure {
                kind: FailureKind::EmptyResult,
                ..
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_timer_suppresses_everything() {
        let checker = Arc::new(Scripted::new());
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        poller.cancel();

        drain_timers().await;
        assert_eq!(checker.call_count(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.phase(), PollPhase::Idle);
        assert_eq!(poller.handle(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let checker = Arc::new(Scripted::new());
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        assert!(!poller.cancel());
        poller.start("op-1".into(), (), to_sink(&tx));
        assert!(poller.cancel());
        assert!(!poller.cancel());

        drain_timers().await;
        assert_eq!(checker.call_count(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.phase(), PollPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_in_flight_check() {
        let checker = Arc::new(
            Scripted::new()
                .script("op-1", vec![Ok(Status::completed(vec!["late".into()]))])
                .slow("op-1", Duration::from_millis(2_000)),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        // First check starts at 1s and answers at 3s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(poller.phase(), PollPhase::Checking);
        poller.cancel();

        drain_timers().await;
        assert_eq!(checker.call_count(), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.phase(), PollPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn start_supersedes_scheduled_session() {
        let checker = Arc::new(
            Scripted::new().script("op-b", vec![Ok(Status::completed(vec!["b".into()]))]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx_a, mut rx_a) = sink_channel();
        let (tx_b, mut rx_b) = sink_channel();

        poller.start("op-a".into(), (), to_sink(&tx_a));
        tokio::time::sleep(Duration::from_millis(500)).await;
        poller.start("op-b".into(), (), to_sink(&tx_b));

        let result = rx_b.recv().await.unwrap();
        assert_eq!(result, PollResult::Success(vec!["b".to_string()]));

        drain_timers().await;
        assert!(rx_a.try_recv().is_err());
        let calls = checker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "op-b");
        assert_near(calls[0].1, 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn start_supersedes_in_flight_check() {
        let checker = Arc::new(
            Scripted::new()
                .script("op-a", vec![Ok(Status::completed(vec!["stale".into()]))])
                .slow("op-a", Duration::from_millis(2_000))
                .script("op-b", vec![Ok(Status::failed("quota"))]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx_a, mut rx_a) = sink_channel();
        let (tx_b, mut rx_b) = sink_channel();

        poller.start("op-a".into(), (), to_sink(&tx_a));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        poller.start("op-b".into(), (), to_sink(&tx_b));
        assert_eq!(poller.attempts(), 0);
        assert_eq!(poller.current_interval(), Duration::from_millis(2_000));

        let result = rx_b.recv().await.unwrap();
        assert_eq!(result.category(), "backend");

        drain_timers().await;
        assert!(rx_a.try_recv().is_err());
        assert_eq!(poller.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_terminal_resets_counters() {
        let checker = Arc::new(
            Scripted::new()
                .script("op-1", vec![Ok(Status::failed("boom"))])
                .script("op-2", vec![Ok(Status::completed(vec!["ok".into()]))]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        assert_eq!(rx.recv().await.unwrap().category(), "backend");
        assert_eq!(poller.phase(), PollPhase::Terminal);

        poller.start("op-2".into(), (), to_sink(&tx));
        assert_eq!(poller.phase(), PollPhase::Scheduled);
        assert_eq!(poller.attempts(), 0);
        assert_eq!(poller.handle(), Some(OperationHandle::new("op-2")));
        assert!(rx.recv().await.unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_result_reports_nothing_stopped() {
        let checker = Arc::new(
            Scripted::new().script("op-1", vec![Ok(Status::completed(vec!["ok".into()]))]),
        );
        let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
        let (tx, mut rx) = sink_channel();

        poller.start("op-1".into(), (), to_sink(&tx));
        assert!(rx.recv().await.unwrap().is_success());

        assert!(!poller.cancel());
        assert_eq!(poller.phase(), PollPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poller_stops_polling() {
        let checker = Arc::new(Scripted::new());
        let (tx, mut rx) = sink_channel();
        {
            let poller = OperationPoller::new(Arc::clone(&checker), fast_config());
            poller.start("op-1".into(), (), to_sink(&tx));
        }

        drain_timers().await;
        assert_eq!(checker.call_count(), 0);
        assert!(rx.try_recv().is_err());
    }
}
