//! Generation-guarded restart loop.
//!
//! Every `begin()` opens a new generation. A session only keeps running, and
//! only performs side effects, while its token is current: the supervisor is
//! active and no newer generation has been opened since.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use climate_common::ClimateConfig;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct SupervisorState {
    generation: AtomicU64,
    active: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    generation: u64,
    state: Arc<SupervisorState>,
}

impl SessionToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
            && self.state.generation.load(Ordering::SeqCst) == self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub error_restart_interval: Duration,
    pub restart_on_error: bool,
    pub notify_on_error: bool,
}

impl RestartPolicy {
    pub fn from_config(config: &ClimateConfig) -> Self {
        Self {
            error_restart_interval: Duration::from_secs(config.error_restart_interval_secs),
            restart_on_error: config.restart_on_error,
            notify_on_error: config.notify_on_error,
        }
    }
}

/// One controller's session body as seen by the supervisor.
pub trait SessionRunner: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start_session(&self, token: &SessionToken)
        -> impl Future<Output = anyhow::Result<()>> + Send;

    fn tick(&self, token: &SessionToken) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Re-read before every sleep so interval changes apply on the next tick.
    fn polling_interval(&self) -> impl Future<Output = Duration> + Send;

    fn report_failure(&self, err: &anyhow::Error) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    state: Arc<SupervisorState>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Marks the controller active and supersedes any running session.
    pub fn begin(&self) -> SessionToken {
        self.state.active.store(true, Ordering::SeqCst);
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        SessionToken {
            generation,
            state: Arc::clone(&self.state),
        }
    }

    /// Opens the generation after `token` for an error restart. Never touches
    /// the active flag, so a concurrent `deactivate()` leaves the returned
    /// token stale.
    pub fn restart(&self, token: &SessionToken) -> Option<SessionToken> {
        if !token.is_current() {
            return None;
        }
        self.state
            .generation
            .compare_exchange(
                token.generation,
                token.generation + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()?;
        Some(SessionToken {
            generation: token.generation + 1,
            state: Arc::clone(&self.state),
        })
    }

    /// Running sessions notice at their next loop check; nothing is preempted.
    pub fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
    }

    pub fn start<R: SessionRunner>(
        &self,
        runner: Arc<R>,
        policy: RestartPolicy,
    ) -> tokio::task::JoinHandle<()> {
        let token = self.begin();
        tokio::spawn(run(self.clone(), runner, token, policy))
    }
}

async fn run<R: SessionRunner>(
    supervisor: Supervisor,
    runner: Arc<R>,
    mut token: SessionToken,
    policy: RestartPolicy,
) {
    loop {
        info!(
            controller = runner.name(),
            generation = token.generation(),
            "session starting"
        );

        let err = match drive(runner.as_ref(), &token).await {
            Ok(()) => {
                debug!(
                    controller = runner.name(),
                    generation = token.generation(),
                    "session ended"
                );
                return;
            }
            Err(err) => err,
        };

        error!(
            controller = runner.name(),
            generation = token.generation(),
            "session failed: {err:#}"
        );

        if !policy.restart_on_error {
            return;
        }
        if policy.notify_on_error && token.is_current() {
            runner.report_failure(&err).await;
        }

        tokio::time::sleep(policy.error_restart_interval).await;

        match supervisor.restart(&token) {
            Some(next) => token = next,
            None => {
                debug!(
                    controller = runner.name(),
                    generation = token.generation(),
                    "superseded during restart backoff"
                );
                return;
            }
        }
    }
}

async fn drive<R: SessionRunner>(runner: &R, token: &SessionToken) -> anyhow::Result<()> {
    if !token.is_current() {
        return Ok(());
    }
    runner.start_session(token).await?;

    while token.is_current() {
        runner.tick(token).await?;
        let interval = runner.polling_interval().await;
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        ticks: Mutex<Vec<u64>>,
        calls: Mutex<Vec<u64>>,
        failing_ticks: AtomicUsize,
        failures_reported: AtomicUsize,
    }

    impl RecordingRunner {
        fn failing(count: usize) -> Self {
            Self {
                failing_ticks: AtomicUsize::new(count),
                ..Self::default()
            }
        }
    }

    impl SessionRunner for RecordingRunner {
        fn name(&self) -> &str {
            "test"
        }

        async fn start_session(&self, _token: &SessionToken) -> anyhow::Result<()> {
            Ok(())
        }

        async fn tick(&self, token: &SessionToken) -> anyhow::Result<()> {
            self.calls.lock().await.push(token.generation());
            if token.is_current() {
                self.ticks.lock().await.push(token.generation());
            }
            let remaining = self.failing_ticks.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_ticks.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("sensor unavailable");
            }
            Ok(())
        }

        async fn polling_interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn report_failure(&self, _err: &anyhow::Error) {
            self.failures_reported.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy() -> RestartPolicy {
        RestartPolicy {
            error_restart_interval: Duration::from_secs(60),
            restart_on_error: true,
            notify_on_error: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_generation_leaves_exactly_one_live_loop() {
        let supervisor = Supervisor::new();
        let runner = Arc::new(RecordingRunner::default());

        let first = supervisor.start(Arc::clone(&runner), policy());
        tokio::time::sleep(Duration::from_secs(30)).await;
        supervisor.start(Arc::clone(&runner), policy());
        tokio::time::sleep(Duration::from_secs(100)).await;

        // Generation 1 woke at 60 s and exited without ticking again;
        // generation 2 ticked at 30 s and 90 s.
        assert!(first.is_finished());
        assert_eq!(runner.calls.lock().await.clone(), vec![1, 2, 2]);
        assert_eq!(runner.ticks.lock().await.clone(), vec![1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_restarts_with_new_generation_after_backoff() {
        let supervisor = Supervisor::new();
        let runner = Arc::new(RecordingRunner::failing(1));

        supervisor.start(Arc::clone(&runner), policy());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runner.ticks.lock().await.clone(), vec![1]);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(runner.ticks.lock().await.clone(), vec![1, 2]);
        assert_eq!(runner.failures_reported.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivation_during_backoff_cancels_restart() {
        let supervisor = Supervisor::new();
        let runner = Arc::new(RecordingRunner::failing(1));

        let handle = supervisor.start(Arc::clone(&runner), policy());
        tokio::time::sleep(Duration::from_secs(10)).await;
        supervisor.deactivate();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(handle.is_finished());
        assert_eq!(runner.ticks.lock().await.clone(), vec![1]);
        assert_eq!(supervisor.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_disabled_stops_after_first_failure() {
        let supervisor = Supervisor::new();
        let runner = Arc::new(RecordingRunner::failing(1));
        let no_restart = RestartPolicy {
            restart_on_error: false,
            ..policy()
        };

        let handle = supervisor.start(Arc::clone(&runner), no_restart);
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert!(handle.is_finished());
        assert_eq!(runner.ticks.lock().await.clone(), vec![1]);
        assert_eq!(runner.failures_reported.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restart_advances_generation_without_reactivating() {
        let supervisor = Supervisor::new();
        let first = supervisor.begin();

        let second = supervisor.restart(&first).unwrap();
        assert_eq!(second.generation(), 2);
        assert!(!first.is_current());
        assert!(second.is_current());

        supervisor.deactivate();
        assert!(supervisor.restart(&second).is_none());
        assert!(!supervisor.is_active());
        assert_eq!(supervisor.generation(), 2);
    }

    #[test]
    fn restart_after_deactivation_yields_stale_token() {
        let supervisor = Supervisor::new();
        let token = supervisor.begin();

        let restarted = supervisor.restart(&token).unwrap();
        supervisor.deactivate();

        assert!(!restarted.is_current());
        assert!(!supervisor.is_active());
    }

    #[test]
    fn restart_from_superseded_token_is_refused() {
        let supervisor = Supervisor::new();
        let old = supervisor.begin();
        let _newer = supervisor.begin();

        assert!(supervisor.restart(&old).is_none());
        assert_eq!(supervisor.generation(), 2);
    }

    #[test]
    fn token_goes_stale_on_deactivate_and_on_new_generation() {
        let supervisor = Supervisor::new();
        let first = supervisor.begin();
        assert!(first.is_current());

        let second = supervisor.begin();
        assert!(!first.is_current());
        assert!(second.is_current());

        supervisor.deactivate();
        assert!(!second.is_current());
    }
}
