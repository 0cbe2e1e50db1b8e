//! Refresh Coordinator
//!
//! Single-flight renewal of the access credential. One actor task owns the
//! `Idle`/`Refreshing` state and the queue of waiting requests; handles talk
//! to it over a channel. However many requests fail authorization at once,
//! at most one exchange is outstanding, and its outcome is fanned out to
//! every waiter in arrival order.

use futures::future::{BoxFuture, FutureExt, OptionFuture};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{AuthenticationError, SessionError, SessionExpiry};
use crate::session::SessionSink;
use crate::telemetry::SessionMetrics;
use crate::token::{CredentialStore, TokenExchanger};
use crate::types::{
    AccessToken, ClientConfig, ExchangedCredentials, RefreshRotation, RefreshToken,
};

/// Refresh behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Upper bound on a single exchange call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Whether a refresh credential returned by the exchange replaces the stored one.
    pub rotation: RefreshRotation,
}

impl From<&ClientConfig> for RefreshOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.refresh_timeout,
            rotation: config.refresh_rotation,
        }
    }
}

/// Coordinator phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPhase {
    #[default]
    Idle,
    Refreshing,
}

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    /// Current phase.
    pub phase: RefreshPhase,
    /// Requests queued behind the in-flight exchange.
    pub waiting: usize,
    /// Refresh episodes settled so far, successful or not.
    pub episodes: u64,
}

type Waiter = oneshot::Sender<Result<AccessToken, SessionExpiry>>;

type ExchangeFuture = BoxFuture<'static, Result<ExchangedCredentials, SessionExpiry>>;

enum Command {
    Join(Waiter),
}

enum CoordinatorState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

/// Handle to the refresh coordinator actor.
///
/// Cloning is cheap; every clone talks to the same actor. The actor stops
/// once the last handle is dropped and no exchange is in flight.
#[derive(Clone)]
pub struct RefreshCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<CoordinatorSnapshot>,
}

impl RefreshCoordinator {
    /// Spawn the coordinator actor on the current tokio runtime.
    pub fn spawn(
        store: Arc<dyn CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
        sink: Arc<dyn SessionSink>,
        options: RefreshOptions,
        metrics: Arc<dyn SessionMetrics>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (publisher, snapshots) = watch::channel(CoordinatorSnapshot::default());

        let actor = CoordinatorActor {
            store,
            exchanger,
            sink,
            options,
            metrics,
            state: CoordinatorState::Idle,
            publisher,
            episodes: 0,
            started_at: None,
            exchanging: None,
        };
        tokio::spawn(actor.run(receiver));

        Self {
            commands,
            snapshots,
        }
    }

    /// Wait for a renewed access credential.
    ///
    /// Starts an exchange when none is in flight, otherwise joins the
    /// current one. Resolves once the exchange settles.
    pub async fn refreshed_access(&self) -> Result<AccessToken, SessionError> {
        let (waiter, reply) = oneshot::channel();
        self.commands
            .send(Command::Join(waiter))
            .map_err(|_| AuthenticationError::CoordinatorUnavailable)?;

        match reply.await {
            Ok(Ok(access)) => Ok(access),
            Ok(Err(expiry)) => Err(expiry.into()),
            Err(_) => Err(AuthenticationError::CoordinatorUnavailable.into()),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        *self.snapshots.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.snapshots.clone()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

struct CoordinatorActor {
    store: Arc<dyn CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
    sink: Arc<dyn SessionSink>,
    options: RefreshOptions,
    metrics: Arc<dyn SessionMetrics>,
    state: CoordinatorState,
    publisher: watch::Sender<CoordinatorSnapshot>,
    episodes: u64,
    started_at: Option<Instant>,
    /// Refresh credential of the session being renewed.
    exchanging: Option<RefreshToken>,
}

impl CoordinatorActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut inflight: Option<ExchangeFuture> = None;
        let mut closed = false;

        loop {
            tokio::select! {
                command = commands.recv(), if !closed => match command {
                    Some(Command::Join(waiter)) => {
                        if let Some(exchange) = self.join(waiter) {
                            inflight = Some(exchange);
                        }
                    }
                    None if inflight.is_none() => break,
                    None => closed = true,
                },
                Some(outcome) = OptionFuture::from(inflight.as_mut()), if inflight.is_some() => {
                    inflight = None;
                    self.settle(outcome);
                    if closed {
                        break;
                    }
                }
            }
        }

        debug!("refresh coordinator stopped");
    }

    fn join(&mut self, waiter: Waiter) -> Option<ExchangeFuture> {
        if let CoordinatorState::Refreshing { waiters } = &mut self.state {
            waiters.push_back(waiter);
            debug!(waiting = waiters.len(), "joined in-flight refresh");
            self.metrics.record_refresh_joined();
            self.publish();
            return None;
        }

        self.state = CoordinatorState::Refreshing {
            waiters: VecDeque::from([waiter]),
        };
        self.started_at = Some(Instant::now());

        let Some(refresh) = self.store.refresh_token() else {
            self.settle(Err(SessionExpiry::NoRefreshCredential));
            return None;
        };

        info!("access credential rejected; starting refresh exchange");
        self.exchanging = Some(refresh.clone());
        self.metrics.record_refresh_started();
        self.publish();

        Some(exchange(self.exchanger.clone(), refresh, self.options.timeout))
    }

    fn settle(&mut self, outcome: Result<ExchangedCredentials, SessionExpiry>) {
        let duration_ms = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or_default();
        let superseded = self.session_replaced();

        match outcome {
            Ok(credentials) => {
                let access = credentials.access;
                if superseded {
                    info!("session changed during refresh; leaving store untouched");
                } else {
                    self.store.set_access_token(access.clone());
                    if self.options.rotation == RefreshRotation::Rotate {
                        if let Some(refresh) = credentials.refresh {
                            self.store.set_refresh_token(refresh);
                        }
                    }
                }

                let waiters = self.drain();
                info!(waiters = waiters.len(), "refresh succeeded; replaying requests");
                self.metrics
                    .record_refresh_settled(true, waiters.len(), duration_ms);

                for waiter in waiters {
                    if waiter.send(Ok(access.clone())).is_err() {
                        debug!("waiter dropped before refresh settled");
                    }
                }
            }
            Err(expiry) => {
                let waiters = self.drain();
                warn!(reason = %expiry, waiters = waiters.len(), "refresh failed; ending session");
                self.metrics
                    .record_refresh_settled(false, waiters.len(), duration_ms);

                if !superseded {
                    self.store.clear();
                }
                for waiter in waiters {
                    if waiter.send(Err(expiry.clone())).is_err() {
                        debug!("waiter dropped before refresh settled");
                    }
                }

                if superseded {
                    info!("session changed during refresh; not ending it");
                } else {
                    self.metrics.record_session_ended();
                    self.sink.on_session_ended();
                }
            }
        }
    }

    /// The store no longer holds the session whose refresh credential was
    /// exchanged (logout or a new sign-in happened meanwhile).
    fn session_replaced(&mut self) -> bool {
        match self.exchanging.take() {
            Some(exchanged) => self
                .store
                .refresh_token()
                .map_or(true, |current| current.secret() != exchanged.secret()),
            None => false,
        }
    }

    /// Take the queue and return to `Idle` in one step.
    fn drain(&mut self) -> VecDeque<Waiter> {
        let waiters = match std::mem::replace(&mut self.state, CoordinatorState::Idle) {
            CoordinatorState::Refreshing { waiters } => waiters,
            CoordinatorState::Idle => VecDeque::new(),
        };
        self.episodes += 1;
        self.publish();
        waiters
    }

    fn publish(&self) {
        let snapshot = match &self.state {
            CoordinatorState::Idle => CoordinatorSnapshot {
                phase: RefreshPhase::Idle,
                waiting: 0,
                episodes: self.episodes,
            },
            CoordinatorState::Refreshing { waiters } => CoordinatorSnapshot {
                phase: RefreshPhase::Refreshing,
                waiting: waiters.len(),
                episodes: self.episodes,
            },
        };
        self.publisher.send_replace(snapshot);
    }
}

fn exchange(
    exchanger: Arc<dyn TokenExchanger>,
    refresh: RefreshToken,
    timeout: Option<Duration>,
) -> ExchangeFuture {
    async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchanger.exchange(&refresh)).await {
                Ok(result) => result,
                Err(_) => return Err(SessionExpiry::ExchangeTimedOut { timeout: limit }),
            },
            None => exchanger.exchange(&refresh).await,
        };

        result.map_err(|e| {
            warn!(error = %e, "refresh exchange failed");
            SessionExpiry::from_exchange_error(&e)
        })
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::session::MockSessionSink;
    use crate::telemetry::{InMemoryMetrics, NoOpMetrics};
    use crate::token::{MockCredentialStore, MockTokenExchanger, StoreOperation};
    use crate::types::{CredentialPair, Identity};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct Fixture {
        store: Arc<MockCredentialStore>,
        exchanger: Arc<MockTokenExchanger>,
        sink: Arc<MockSessionSink>,
        coordinator: RefreshCoordinator,
    }

    fn fixture(store: MockCredentialStore, options: RefreshOptions) -> Fixture {
        let store = Arc::new(store);
        let exchanger = Arc::new(MockTokenExchanger::new());
        let sink = Arc::new(MockSessionSink::new());
        let coordinator = RefreshCoordinator::spawn(
            store.clone(),
            exchanger.clone(),
            sink.clone(),
            options,
            Arc::new(NoOpMetrics),
        );
        Fixture {
            store,
            exchanger,
            sink,
            coordinator,
        }
    }

    fn rejected(status: u16) -> SessionError {
        SessionError::Api(ApiError {
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            body: String::new(),
        })
    }

    async fn wait_for_waiting(coordinator: &RefreshCoordinator, n: usize) {
        coordinator
            .subscribe()
            .wait_for(|s| s.waiting == n)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_updates_store() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        f.exchanger.queue_success("a2", None);

        let access = f.coordinator.refreshed_access().await.unwrap();

        assert_eq!(access.secret(), "a2");
        assert_eq!(f.store.access_token().unwrap().secret(), "a2");
        assert_eq!(f.exchanger.get_refresh_tokens(), vec!["r1"]);
        assert_eq!(f.sink.call_count(), 0);

        let snapshot = f.coordinator.snapshot();
        assert_eq!(snapshot.phase, RefreshPhase::Idle);
        assert_eq!(snapshot.episodes, 1);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_exchange() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = f.coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator.refreshed_access().await
            }));
        }

        wait_for_waiting(&f.coordinator, 5).await;
        assert_eq!(f.coordinator.snapshot().phase, RefreshPhase::Refreshing);

        gate.open();
        for task in tasks {
            let access = task.await.unwrap().unwrap();
            assert_eq!(access.secret(), "refreshed-access-1");
        }

        assert_eq!(f.exchanger.call_count(), 1);
        assert_eq!(f.coordinator.snapshot().episodes, 1);
    }

    #[tokio::test]
    async fn test_waiters_resolve_in_arrival_order() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for i in 0..4 {
            let coordinator = f.coordinator.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let result = coordinator.refreshed_access().await;
                order.lock().push(i);
                result
            }));
            wait_for_waiting(&f.coordinator, i + 1).await;
        }

        gate.open();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_refresh_fails_without_exchange() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", None),
            RefreshOptions::default(),
        );

        let err = f.coordinator.refreshed_access().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Authentication(AuthenticationError::SessionExpired(
                SessionExpiry::NoRefreshCredential
            ))
        ));
        assert_eq!(f.exchanger.call_count(), 0);
        assert_eq!(f.sink.call_count(), 1);
        assert_eq!(f.store.clear_count(), 1);
        assert!(f.store.access_token().is_none());
        assert_eq!(f.coordinator.snapshot().phase, RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_exchange_rejects_all_and_notifies_once() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();
        f.exchanger.queue_error(rejected(401));

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let coordinator = f.coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator.refreshed_access().await
            }));
        }
        wait_for_waiting(&f.coordinator, 3).await;
        gate.open();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(
                err,
                SessionError::Authentication(AuthenticationError::SessionExpired(
                    SessionExpiry::ExchangeRejected { status: 401 }
                ))
            ));
        }

        assert_eq!(f.exchanger.call_count(), 1);
        assert_eq!(f.sink.call_count(), 1);
        assert_eq!(f.store.clear_count(), 1);
        assert!(f.store.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_store_cleared_before_sink_notified() {
        let store = Arc::new(MockCredentialStore::with_tokens("a1", None));
        let observed = Arc::new(Mutex::new(None));
        let sink: Arc<dyn SessionSink> = {
            let store = store.clone();
            let observed = observed.clone();
            Arc::new(move || {
                *observed.lock() = Some(store.access_token().is_none());
            })
        };
        let coordinator = RefreshCoordinator::spawn(
            store,
            Arc::new(MockTokenExchanger::new()),
            sink,
            RefreshOptions::default(),
            Arc::new(NoOpMetrics),
        );

        assert!(coordinator.refreshed_access().await.is_err());
        assert_eq!(*observed.lock(), Some(true));
    }

    #[tokio::test]
    async fn test_each_episode_runs_its_own_exchange() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );

        let first = f.coordinator.refreshed_access().await.unwrap();
        let second = f.coordinator.refreshed_access().await.unwrap();

        assert_eq!(first.secret(), "refreshed-access-1");
        assert_eq!(second.secret(), "refreshed-access-2");
        assert_eq!(f.exchanger.call_count(), 2);
        assert_eq!(f.coordinator.snapshot().episodes, 2);
    }

    #[tokio::test]
    async fn test_rotation_replaces_refresh_credential() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions {
                rotation: RefreshRotation::Rotate,
                ..Default::default()
            },
        );
        f.exchanger.queue_success("a2", Some("r2"));
        f.exchanger.queue_success("a3", Some("r3"));

        f.coordinator.refreshed_access().await.unwrap();
        assert_eq!(f.store.refresh_token().unwrap().secret(), "r2");

        f.coordinator.refreshed_access().await.unwrap();
        assert_eq!(f.exchanger.get_refresh_tokens(), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_reuse_keeps_refresh_credential() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        f.exchanger.queue_success("a2", Some("r2"));

        f.coordinator.refreshed_access().await.unwrap();
        assert_eq!(f.store.refresh_token().unwrap().secret(), "r1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_timeout_ends_session() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions {
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        );
        let _gate = f.exchanger.hold();

        let err = f.coordinator.refreshed_access().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Authentication(AuthenticationError::SessionExpired(
                SessionExpiry::ExchangeTimedOut { .. }
            ))
        ));
        assert_eq!(f.sink.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_block_others() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();

        let abandoned = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&f.coordinator, 1).await;
        let kept = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&f.coordinator, 2).await;

        abandoned.abort();
        gate.open();

        assert_eq!(kept.await.unwrap().unwrap().secret(), "refreshed-access-1");
    }

    #[tokio::test]
    async fn test_logout_during_exchange_stays_signed_out() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();

        let pending = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&f.coordinator, 1).await;
        f.store.clear();
        gate.open();

        assert_eq!(pending.await.unwrap().unwrap().secret(), "refreshed-access-1");
        assert!(f.store.access_token().is_none());
        assert!(f.store.refresh_token().is_none());
        assert_eq!(f.store.get_history(), vec![StoreOperation::Clear]);
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_session_signed_in_meanwhile() {
        let f = fixture(
            MockCredentialStore::with_tokens("a1", Some("r1")),
            RefreshOptions::default(),
        );
        let gate = f.exchanger.hold();
        f.exchanger.queue_error(rejected(401));

        let pending = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&f.coordinator, 1).await;
        f.store
            .set_session(CredentialPair::new("a9", "r9"), Identity::new(9, "grace"));
        gate.open();

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(f.store.clear_count(), 0);
        assert_eq!(f.store.access_token().unwrap().secret(), "a9");
        assert_eq!(f.store.refresh_token().unwrap().secret(), "r9");
        assert_eq!(f.sink.call_count(), 0);
        assert_eq!(f.coordinator.snapshot().phase, RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let store = Arc::new(MockCredentialStore::with_tokens("a1", Some("r1")));
        let exchanger = Arc::new(MockTokenExchanger::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let coordinator = RefreshCoordinator::spawn(
            store,
            exchanger.clone(),
            Arc::new(MockSessionSink::new()),
            RefreshOptions::default(),
            metrics.clone(),
        );
        let gate = exchanger.hold();

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&coordinator, 1).await;
        let second = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refreshed_access().await })
        };
        wait_for_waiting(&coordinator, 2).await;
        gate.open();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(metrics.count("session_refresh_started_total"), 1);
        assert_eq!(metrics.count("session_refresh_joined_total"), 1);
        let settled = metrics.get_entries_by_name("session_refresh_settled_total");
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].value, 2.0);
    }
}
