//! Stream connection manager.
//!
//! Manages the single WebSocket connection to the Vidarr server,
//! handling automatic reconnection with exponential backoff, frame
//! decoding, and delivery to the dispatcher. An epoch counter guards
//! against stale retry timers and connection attempts racing a
//! shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{info, warn, debug};

use vd_core::error::{VdError, VdResult};

use crate::backoff::BackoffPolicy;
use crate::dispatcher::Dispatcher;
use crate::message::StreamMessage;
use crate::transport::{Connector, Transport, WsConnector};

/// Connection state of the stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Attempting to establish a connection.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection lost; waiting out the backoff delay.
    PendingRetry,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::PendingRetry => "pending-retry",
        };
        write!(f, "{s}")
    }
}

/// Stream connection manager.
///
/// Manages the full lifecycle of the event stream connection:
/// - Initial connection and automatic reconnection with exponential
///   backoff (1s, 2s, 4s, 8s, 16s, max 30s)
/// - Frame decoding and delivery to the [`Dispatcher`]
/// - Connection state broadcasting via a watch channel
/// - Graceful, terminal shutdown
///
/// The retry counter increments once per observed error signal (a
/// failed dial or a mid-session transport error) and resets to zero
/// only when a connection opens successfully. A server that closes the
/// stream cleanly does not increment it.
pub struct StreamManager {
    /// WebSocket endpoint this manager dials.
    url: String,
    /// Connector used to open transports.
    connector: Arc<dyn Connector>,
    /// Dispatcher fed with every decoded message.
    dispatcher: Dispatcher,
    /// Backoff policy for reconnection delays.
    backoff: BackoffPolicy,
    /// Watch channel holding the current connection state.
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped at every connection attempt and on shutdown. Work
    /// scheduled under an older epoch is abandoned when it wakes.
    epoch: Arc<AtomicU64>,
    /// Consecutive error signals since the last successful open.
    retries: Arc<AtomicU32>,
    /// Shutdown signal observed by the run loop.
    shutdown_tx: watch::Sender<bool>,
    /// Handle to the background run loop task.
    run_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Set once by shutdown; a closed manager never restarts.
    closed: AtomicBool,
}

impl StreamManager {
    /// Create a manager for the given WebSocket endpoint.
    pub fn new(url: String, dispatcher: Dispatcher) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            url,
            connector: Arc::new(WsConnector),
            dispatcher,
            backoff: BackoffPolicy::default(),
            state_tx,
            epoch: Arc::new(AtomicU64::new(0)),
            retries: Arc::new(AtomicU32::new(0)),
            shutdown_tx,
            run_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the connector. Tests use this to script connections.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Set a custom backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Consecutive error signals since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// The dispatcher this manager feeds.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Start the connection loop.
    ///
    /// Launches a background task that owns the transport and keeps the
    /// connection alive until [`shutdown`](Self::shutdown) is called.
    /// Calling `start` on a running manager is a no-op; calling it on a
    /// shut-down manager is an error.
    pub async fn start(&self) -> VdResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VdError::Socket("stream manager is shut down".into()));
        }

        let mut task = self.run_task.lock().await;
        if task.is_some() {
            debug!("stream already running, skipping start");
            return Ok(());
        }

        info!("stream connecting to {}", self.url);

        let run = RunLoop {
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
            dispatcher: self.dispatcher.clone(),
            backoff: self.backoff,
            state_tx: self.state_tx.clone(),
            epoch: Arc::clone(&self.epoch),
            retries: Arc::clone(&self.retries),
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        *task = Some(tokio::spawn(run.run()));
        Ok(())
    }

    /// Tear the connection down and stop all retries.
    ///
    /// Terminal: pending retry timers are cancelled, the transport is
    /// closed, and the manager never reconnects afterwards. Repeated
    /// calls are no-ops.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("stream already shut down");
            return;
        }

        // Invalidate in-flight attempts and timers before waking the
        // run loop.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let task = self.run_task.lock().await.take();
        if let Some(handle) = task {
            let _ = handle.await;
        }

        set_state(&self.state_tx, ConnectionState::Disconnected);
        info!("stream shut down");
    }
}

/// Update the shared state and log the transition.
fn set_state(state_tx: &watch::Sender<ConnectionState>, new_state: ConnectionState) {
    state_tx.send_if_modified(|state| {
        if *state == new_state {
            return false;
        }
        info!("stream state: {state} -> {new_state}");
        *state = new_state;
        true
    });
}

/// How a connected session ended.
enum SessionEnd {
    /// The server closed the stream without an error.
    CleanClose,
    /// The transport failed mid-session.
    Error,
    /// Shutdown was requested.
    Shutdown,
}

/// State moved into the background connection task.
struct RunLoop {
    url: String,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    backoff: BackoffPolicy,
    state_tx: watch::Sender<ConnectionState>,
    epoch: Arc<AtomicU64>,
    retries: Arc<AtomicU32>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RunLoop {
    async fn run(mut self) {
        loop {
            let attempt_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            set_state(&self.state_tx, ConnectionState::Connecting);

            let dialed = tokio::select! {
                result = self.connector.connect(&self.url) => result,
                _ = self.shutdown_rx.changed() => {
                    set_state(&self.state_tx, ConnectionState::Disconnected);
                    return;
                }
            };

            match dialed {
                Ok(mut transport) => {
                    if self.epoch.load(Ordering::SeqCst) != attempt_epoch {
                        // A shutdown raced the handshake; this transport
                        // is already stale.
                        transport.close().await;
                        set_state(&self.state_tx, ConnectionState::Disconnected);
                        return;
                    }

                    self.retries.store(0, Ordering::SeqCst);
                    set_state(&self.state_tx, ConnectionState::Connected);
                    info!("stream connected to {}", self.url);

                    match self.pump_frames(&mut *transport).await {
                        SessionEnd::Shutdown => {
                            transport.close().await;
                            set_state(&self.state_tx, ConnectionState::Disconnected);
                            return;
                        }
                        SessionEnd::Error => {
                            self.retries.fetch_add(1, Ordering::SeqCst);
                        }
                        SessionEnd::CleanClose => {}
                    }
                }
                Err(e) => {
                    warn!("stream connect failed: {e}");
                    self.retries.fetch_add(1, Ordering::SeqCst);
                }
            }

            if self.epoch.load(Ordering::SeqCst) != attempt_epoch {
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return;
            }

            let retry_count = self.retries.load(Ordering::SeqCst);
            let delay = self.backoff.delay(retry_count);
            set_state(&self.state_tx, ConnectionState::PendingRetry);
            warn!(
                "stream retry in {:.1}s (retry count {retry_count})",
                delay.as_secs_f64()
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_rx.changed() => {
                    info!("stream retry cancelled by shutdown");
                    set_state(&self.state_tx, ConnectionState::Disconnected);
                    return;
                }
            }

            if self.epoch.load(Ordering::SeqCst) != attempt_epoch {
                // The timer outlived a shutdown; do not reconnect.
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return;
            }
        }
    }

    /// Pump frames into the dispatcher until the session ends.
    async fn pump_frames(&mut self, transport: &mut dyn Transport) -> SessionEnd {
        loop {
            tokio::select! {
                frame = transport.next_frame() => match frame {
                    Some(Ok(text)) => match StreamMessage::from_frame(&text) {
                        Ok(message) => {
                            let delivered = self.dispatcher.dispatch(&message);
                            debug!(
                                "stream event {} delivered to {delivered} subscriber(s)",
                                message.event_type.as_str()
                            );
                        }
                        Err(e) => warn!("dropping malformed frame: {e}"),
                    },
                    Some(Err(e)) => {
                        warn!("stream read error: {e}");
                        return SessionEnd::Error;
                    }
                    None => {
                        info!("stream closed by server");
                        return SessionEnd::CleanClose;
                    }
                },
                _ = self.shutdown_rx.changed() => return SessionEnd::Shutdown,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::registry::{MessageCallback, SubscriptionRegistry};
    use crate::transport::Transport;

    /// Transport scripted through an in-memory channel. Dropping the
    /// matching sender reads as a clean close.
    struct ChannelTransport {
        rx: mpsc::UnboundedReceiver<VdResult<String>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn next_frame(&mut self) -> Option<VdResult<String>> {
            self.rx.recv().await
        }

        async fn close(&mut self) {
            self.rx.close();
        }
    }

    /// Connector whose first `fail_first` dials fail; later dials hand
    /// out channel-backed transports.
    struct ScriptedConnector {
        attempts: AtomicUsize,
        fail_first: usize,
        sessions: StdMutex<Vec<mpsc::UnboundedSender<VdResult<String>>>>,
    }

    impl ScriptedConnector {
        fn new(fail_first: usize) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                fail_first,
                sessions: StdMutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn latest_session(&self) -> Option<mpsc::UnboundedSender<VdResult<String>>> {
            self.sessions.lock().unwrap().last().cloned()
        }

        /// Drop the newest session sender, closing that stream cleanly.
        fn close_latest(&self) {
            self.sessions.lock().unwrap().pop();
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _url: &str) -> VdResult<Box<dyn Transport>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(VdError::Socket("scripted connect failure".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.sessions.lock().unwrap().push(tx);
            Ok(Box::new(ChannelTransport { rx }))
        }
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(5),
            max: Duration::from_millis(20),
        }
    }

    /// Delays long enough to observe the pending-retry window.
    fn slow_backoff() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(60),
            max: Duration::from_millis(240),
        }
    }

    fn test_manager(
        connector: Arc<ScriptedConnector>,
        backoff: BackoffPolicy,
    ) -> (StreamManager, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let manager = StreamManager::new("ws://localhost:3011".into(), dispatcher)
            .with_connector(connector)
            .with_backoff(backoff);
        (manager, registry)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for condition");
    }

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector, fast_backoff());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_connects_and_dispatches_frames() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, registry) = test_manager(connector.clone(), fast_backoff());

        let received: Arc<StdMutex<Vec<serde_json::Value>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let callback: MessageCallback = {
            let received = received.clone();
            Arc::new(move |payload| received.lock().unwrap().push(payload.clone()))
        };
        registry.add(Arc::new(|_m| true), callback);

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        let session = connector.latest_session().unwrap();
        session
            .send(Ok(
                r#"{"type":"downloadProgress","payload":{"jobId":"job-1"}}"#.into()
            ))
            .unwrap();

        wait_until(|| !received.lock().unwrap().is_empty()).await;
        assert_eq!(received.lock().unwrap()[0]["jobId"], "job-1");

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_receiver_observes_connection() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector, fast_backoff());
        let mut rx = manager.state_receiver();

        manager.start().await.unwrap();

        timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if *rx.borrow_and_update() == ConnectionState::Connected {
                    break;
                }
            }
        })
        .await
        .expect("never reached connected");

        manager.shutdown().await;
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_retry_counter_resets_only_after_successful_open() {
        let connector = Arc::new(ScriptedConnector::new(3));
        let (manager, _registry) = test_manager(connector.clone(), fast_backoff());

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        // Three failed dials, then the fourth attempt succeeds and
        // resets the counter.
        assert_eq!(connector.attempts(), 4);
        assert_eq!(manager.retry_count(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_error_increments_retry_count() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector.clone(), slow_backoff());

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        connector
            .latest_session()
            .unwrap()
            .send(Err(VdError::Socket("mid-session failure".into())))
            .unwrap();

        wait_until(|| manager.state() == ConnectionState::PendingRetry).await;
        assert_eq!(manager.retry_count(), 1);

        wait_until(|| manager.state() == ConnectionState::Connected).await;
        assert_eq!(manager.retry_count(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_clean_close_does_not_increment_retry_count() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector.clone(), slow_backoff());

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        connector.close_latest();

        // The next delay is computed from a counter still at zero.
        wait_until(|| manager.state() == ConnectionState::PendingRetry).await;
        assert_eq!(manager.retry_count(), 0);

        wait_until(|| manager.state() == ConnectionState::Connected).await;
        assert_eq!(connector.attempts(), 2);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped_not_fatal() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, registry) = test_manager(connector.clone(), fast_backoff());

        let received: Arc<StdMutex<Vec<serde_json::Value>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let callback: MessageCallback = {
            let received = received.clone();
            Arc::new(move |payload| received.lock().unwrap().push(payload.clone()))
        };
        registry.add(Arc::new(|_m| true), callback);

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        let session = connector.latest_session().unwrap();
        session.send(Ok("not json".into())).unwrap();
        session.send(Ok(r#"{"payload":{}}"#.into())).unwrap();
        session.send(Ok(r#"{"type":7,"payload":{}}"#.into())).unwrap();
        session
            .send(Ok(r#"{"type":"downloadComplete","payload":{"videos":[]}}"#.into()))
            .unwrap();

        wait_until(|| received.lock().unwrap().len() == 1).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector.clone(), fast_backoff());

        manager.start().await.unwrap();
        wait_until(|| manager.state() == ConnectionState::Connected).await;

        manager.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(connector.attempts(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnection() {
        let connector = Arc::new(ScriptedConnector::new(usize::MAX));
        let (manager, _registry) = test_manager(connector.clone(), fast_backoff());

        manager.start().await.unwrap();
        wait_until(|| connector.attempts() >= 2).await;

        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // No retry timer survives the shutdown.
        let attempts = connector.attempts();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.attempts(), attempts);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector, fast_backoff());

        manager.start().await.unwrap();
        manager.shutdown().await;
        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_rejected() {
        let connector = Arc::new(ScriptedConnector::new(0));
        let (manager, _registry) = test_manager(connector.clone(), fast_backoff());

        manager.start().await.unwrap();
        manager.shutdown().await;

        assert!(manager.start().await.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.attempts() <= 1);
    }
}
