//! Connection supervisor for the single broker subscription.
//!
//! All connection state lives in one actor task. Commands from the
//! [`SupervisorHandle`] and events from the current session are handled one at
//! a time in that task, which is also the only place observer callbacks are
//! invoked from.
//!
//! # State Machine
//!
//! ```text
//! Idle ──start──► Connecting ──accepted──► Connected ──lost──► Disconnected(pending)
//!                     ▲  │                                         │
//!                     │  └──rejected──► Disconnected               │
//!                     └──────────────── 5s timer / reconnect() ◄────┘
//! ```
//!
//! # Failure handling
//!
//! | Failure            | Observer            | Reconnect            |
//! |--------------------|---------------------|----------------------|
//! | incomplete config  | `on_disconnected`   | never                |
//! | connect rejected   | `on_disconnected`   | only via `reconnect` |
//! | transport lost     | `on_disconnected`   | once, after 5s       |
//! | subscribe refused  | nothing             | n/a, stays connected |
//! | non-text payload   | nothing             | n/a                  |

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ConnectionConfig, SessionOptions, RECONNECT_DELAY};
use super::observer::{IndicatorEvent, ObserverSlot, StatusObserver};
use super::session::{Connecting, Live, Session};
use super::transport::{SessionEvent, Transport};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected {
        subscribed: bool,
    },
    Disconnected {
        pending_reconnect: bool,
    },
}

/// Snapshot published on every change, for status displays and tests.
#[derive(Clone, Debug, Default)]
pub struct SupervisorStatus {
    pub connection_state: ConnectionState,
    pub connection_attempts: u64,
    pub messages_received: usize,
    pub last_error: Option<String>,
    pub last_activity: Option<DateTime<Local>>,
}

#[derive(Clone, Debug)]
pub struct SupervisorSettings {
    /// Options applied to every session
    pub session: SessionOptions,

    /// Wait between a transport loss and the next attempt. Fixed, no growth.
    pub reconnect_delay: Duration,

    /// Capacity of the command channel
    pub command_buffer: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            reconnect_delay: RECONNECT_DELAY,
            command_buffer: 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Connection settings incomplete, missing: {0}")]
    ConfigIncomplete(String),

    #[error("MQTT client not initialized, cannot reconnect")]
    NotInitialized,

    #[error("Supervisor already started with a configuration")]
    AlreadyStarted,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

enum Command {
    Start {
        config: ConnectionConfig,
        response_tx: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Reconnect {
        response_tx: oneshot::Sender<Result<(), SupervisorError>>,
    },
    RegisterObserver(Weak<dyn StatusObserver>),
}

enum ActiveSession {
    Connecting(Session<Connecting>),
    Live(Session<Live>),
}

impl ActiveSession {
    fn close(self) {
        match self {
            ActiveSession::Connecting(session) => session.close(),
            ActiveSession::Live(session) => session.close(),
        }
    }
}

struct Supervisor<T: Transport> {
    transport: T,
    settings: SupervisorSettings,
    config: Option<ConnectionConfig>,
    state: ConnectionState,
    observer: ObserverSlot,
    session: Option<ActiveSession>,
    events: Option<mpsc::Receiver<SessionEvent>>,
    retry: Option<Pin<Box<Sleep>>>,
    attempts: u64,
    status: watch::Sender<SupervisorStatus>,
}

impl<T: Transport> Supervisor<T> {
    fn new(transport: T, settings: SupervisorSettings, status: watch::Sender<SupervisorStatus>) -> Self {
        Self {
            transport,
            settings,
            config: None,
            state: ConnectionState::Idle,
            observer: ObserverSlot::default(),
            session: None,
            events: None,
            retry: None,
            attempts: 0,
            status,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        debug!("Supervisor task running");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Teardown requested");
                    break;
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All supervisor handles dropped");
                        break;
                    }
                },

                event = next_event(&mut self.events) => self.handle_session_event(event),

                _ = retry_due(&mut self.retry) => {
                    self.retry = None;
                    info!("Attempting to reconnect MQTT");
                    self.connect();
                }
            }
        }

        self.retry = None;
        self.close_session();
        self.set_state(ConnectionState::Disconnected {
            pending_reconnect: false,
        });
        info!("Supervisor stopped after {} connection attempt(s)", self.attempts);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                config,
                response_tx,
            } => {
                let result = self.start(config);
                if response_tx.send(result).is_err() {
                    error!("Failed to send start response");
                }
            }
            Command::Reconnect { response_tx } => {
                let result = self.manual_reconnect();
                if response_tx.send(result).is_err() {
                    error!("Failed to send reconnect response");
                }
            }
            Command::RegisterObserver(observer) => self.observer.register(observer),
        }
    }

    fn start(&mut self, config: ConnectionConfig) -> Result<(), SupervisorError> {
        if self.config.is_some() {
            warn!("Ignoring start: supervisor already configured");
            return Err(SupervisorError::AlreadyStarted);
        }

        if !config.is_complete() {
            let missing = config.missing_fields().join(", ");
            error!("Refusing to connect, settings incomplete (missing {})", missing);
            self.record_error(format!("settings incomplete: {}", missing));
            self.set_state(ConnectionState::Disconnected {
                pending_reconnect: false,
            });
            self.observer.notify(&IndicatorEvent::Disconnected);
            return Err(SupervisorError::ConfigIncomplete(missing));
        }

        info!("Starting MQTT supervisor for {}", config);
        info!(
            "Session options: client id '{}', keep-alive {}s, clean session {}, password {}",
            self.settings.session.client_id,
            self.settings.session.keep_alive.as_secs(),
            self.settings.session.clean_session,
            if config.password.is_some() { "set" } else { "not set" }
        );
        self.config = Some(config);
        self.connect();
        Ok(())
    }

    fn manual_reconnect(&mut self) -> Result<(), SupervisorError> {
        if self.config.is_none() {
            warn!("MQTT client not initialized, cannot reconnect");
            return Err(SupervisorError::NotInitialized);
        }
        info!("Reconnecting MQTT client on request");
        if self.retry.take().is_some() {
            debug!("Cancelled pending scheduled reconnect");
        }
        self.connect();
        Ok(())
    }

    /// Opens a fresh session, closing whatever session existed before.
    fn connect(&mut self) {
        self.close_session();

        let Some(config) = &self.config else {
            warn!("No configuration, not connecting");
            return;
        };

        self.attempts += 1;
        debug!("Opening session #{} to {}", self.attempts, config);
        let (session, events) =
            Session::<Connecting>::open(&self.transport, config, &self.settings.session, self.attempts);

        self.session = Some(ActiveSession::Connecting(session));
        self.events = Some(events);
        let attempts = self.attempts;
        self.status
            .send_modify(|status| status.connection_attempts = attempts);
        self.set_state(ConnectionState::Connecting);
    }

    fn close_session(&mut self) {
        self.events = None;
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn handle_session_event(&mut self, event: Option<SessionEvent>) {
        match event {
            Some(SessionEvent::Accepted) => self.on_accepted(),
            Some(SessionEvent::Rejected(reason)) => self.on_rejected(reason),
            Some(SessionEvent::SubscribeAcked) => {
                if self.state == (ConnectionState::Connected { subscribed: false }) {
                    self.set_state(ConnectionState::Connected { subscribed: true });
                }
            }
            Some(SessionEvent::SubscribeRefused(reason)) => {
                warn!("Broker refused the subscription: {}", reason);
                self.record_error(format!("subscription refused: {}", reason));
            }
            Some(SessionEvent::Publish { topic, payload }) => self.on_publish(&topic, &payload),
            Some(SessionEvent::Lost(reason)) => self.on_transport_lost(reason),
            None => self.on_transport_lost("session event stream closed".to_string()),
        }
    }

    fn on_accepted(&mut self) {
        let session = match self.session.take() {
            Some(ActiveSession::Connecting(session)) => session,
            other => {
                debug!("Ignoring ConnAck outside of a connecting session");
                self.session = other;
                return;
            }
        };

        info!("MQTT connected successfully (session #{})", session.attempt());
        self.set_state(ConnectionState::Connected { subscribed: false });
        self.observer.notify(&IndicatorEvent::Connected);

        match session.establish() {
            Ok(live) => self.session = Some(ActiveSession::Live(live)),
            Err(e) => {
                error!("Failed to request subscription: {}", e);
                self.on_transport_lost(e.to_string());
            }
        }
    }

    /// The broker refused the connect. No reconnect is scheduled.
    fn on_rejected(&mut self, reason: String) {
        warn!("MQTT connection rejected by broker: {}", reason);
        self.close_session();
        self.record_error(format!("connection rejected: {}", reason));
        self.set_state(ConnectionState::Disconnected {
            pending_reconnect: false,
        });
        self.observer.notify(&IndicatorEvent::Disconnected);
    }

    /// Transport failure. Schedules exactly one reconnect after the fixed delay.
    fn on_transport_lost(&mut self, reason: String) {
        let delay = self.settings.reconnect_delay;
        warn!(
            "MQTT disconnected: {} (reconnecting in {}s)",
            reason,
            delay.as_secs()
        );
        self.close_session();
        self.record_error(reason);
        self.retry = Some(Box::pin(sleep(delay)));
        self.set_state(ConnectionState::Disconnected {
            pending_reconnect: true,
        });
        self.observer.notify(&IndicatorEvent::Disconnected);
    }

    fn on_publish(&mut self, topic: &str, payload: &[u8]) {
        let Some(ActiveSession::Live(session)) = &self.session else {
            debug!("Dropping message on '{}' received before subscription", topic);
            return;
        };
        let Some(message) = session.accept(topic, payload) else {
            return;
        };

        info!("MQTT received message: {}", message);
        let received_at = message.timestamp();
        self.status.send_modify(|status| {
            status.messages_received += 1;
            status.last_activity = Some(received_at);
        });
        self.observer
            .notify(&IndicatorEvent::Message(message.into_content()));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
        }
        self.state = state.clone();
        self.status
            .send_modify(|status| status.connection_state = state);
    }

    fn record_error(&self, reason: String) {
        self.status
            .send_modify(|status| status.last_error = Some(reason));
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<SessionEvent>>) -> Option<SessionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Handle for the supervisor task.
///
/// Dropping the handle tears the supervisor down: the session is closed and
/// any pending reconnect is cancelled.
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SupervisorStatus>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn spawn<T: Transport>(transport: T) -> Self {
        Self::spawn_with_settings(transport, SupervisorSettings::default())
    }

    pub fn spawn_with_settings<T: Transport>(transport: T, settings: SupervisorSettings) -> Self {
        info!("Spawning MQTT supervisor with settings: {:?}", settings);

        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
        let (status_tx, status_rx) = watch::channel(SupervisorStatus::default());
        let cancel = CancellationToken::new();

        let supervisor = Supervisor::new(transport, settings, status_tx);
        let task_handle = tokio::spawn(supervisor.run(command_rx, cancel.clone()));

        Self {
            commands: command_tx,
            status: status_rx,
            cancel,
            task_handle: Some(task_handle),
        }
    }

    /// Registers the observer, replacing any previous one. Only a weak
    /// reference is kept.
    pub async fn register_observer<O: StatusObserver + 'static>(
        &self,
        observer: &Arc<O>,
    ) -> Result<(), SupervisorError> {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn StatusObserver> = weak;
        self.send(Command::RegisterObserver(weak)).await
    }

    /// Validates `config` and starts connecting.
    ///
    /// # Errors
    ///
    /// * [`SupervisorError::ConfigIncomplete`] - no session was built; the
    ///   observer got a single `on_disconnected`
    /// * [`SupervisorError::AlreadyStarted`] - a configuration was accepted earlier
    /// * [`SupervisorError::ChannelError`] - the supervisor task is gone
    pub async fn start(&self, config: ConnectionConfig) -> Result<(), SupervisorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Start {
            config,
            response_tx,
        })
        .await?;
        response_rx
            .await
            .map_err(|e| SupervisorError::ChannelError(format!("No start response: {}", e)))?
    }

    /// Replaces the current session with a new one immediately.
    pub async fn reconnect(&self) -> Result<(), SupervisorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(Command::Reconnect { response_tx }).await?;
        response_rx
            .await
            .map_err(|e| SupervisorError::ChannelError(format!("No reconnect response: {}", e)))?
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().connection_state.clone()
    }

    /// Tears the supervisor down and waits for its task to finish.
    pub async fn shutdown(&mut self) {
        debug!("Sending teardown signal to supervisor");
        self.cancel.cancel();

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Supervisor task panicked: {}", e);
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), SupervisorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SupervisorError::ChannelError("supervisor task is gone".to_string()))
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::observer::ChannelObserver;
    use crate::mqtt::transport::mock::{Behaviour, MockBroker};
    use crate::status::{DisplayState, DotColor};
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    fn drain(rx: &mut UnboundedReceiver<IndicatorEvent>) -> Vec<IndicatorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn supervised(
        broker: &MockBroker,
    ) -> (
        SupervisorHandle,
        Arc<ChannelObserver>,
        UnboundedReceiver<IndicatorEvent>,
    ) {
        let handle = SupervisorHandle::spawn(broker.clone());
        let (observer, rx) = ChannelObserver::channel();
        handle.register_observer(&observer).await.unwrap();
        (handle, observer, rx)
    }

    fn alarm_config() -> ConnectionConfig {
        ConnectionConfig::new("10.0.0.5", 1883, "home/alarm")
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_green_message_becomes_green_dot() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;

        handle.start(alarm_config()).await.unwrap();
        settle().await;

        let session = broker.session(0);
        assert_eq!(session.host, "10.0.0.5");
        assert_eq!(session.port, 1883);
        assert_eq!(session.subscriptions, vec!["home/alarm".to_string()]);
        assert_eq!(session.options, SessionOptions::default());
        assert_eq!(
            handle.state(),
            ConnectionState::Connected { subscribed: true }
        );

        let before = Local::now();
        broker.publish("home/alarm", b"green");
        settle().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                IndicatorEvent::Connected,
                IndicatorEvent::Message("green".to_string())
            ]
        );
        assert_eq!(
            events[1].display_state(),
            DisplayState::Dot(DotColor::Green)
        );
        let status = handle.subscribe().borrow().clone();
        assert_eq!(status.messages_received, 1);
        assert!(status.last_activity.is_some_and(|at| at >= before));
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_config_never_connects_and_notifies_once() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;

        let result = handle
            .start(ConnectionConfig::new("", 1883, "t"))
            .await;
        assert!(matches!(result, Err(SupervisorError::ConfigIncomplete(_))));
        settle().await;

        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Disconnected]);
        assert_eq!(broker.open_count(), 0);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(broker.open_count(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                pending_reconnect: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_loss_schedules_one_reconnect_at_a_time() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;
        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Connected]);

        broker.queue(Behaviour::Unreachable);
        broker.drop_connection();
        settle().await;
        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Disconnected]);
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                pending_reconnect: true
            }
        );
        assert!(broker.session(0).closed);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(broker.open_count(), 1);

        // First retry fails at the transport level.
        sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(broker.open_count(), 2);
        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Disconnected]);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(broker.open_count(), 2);

        // Second retry is accepted.
        sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(broker.open_count(), 3);
        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Connected]);
        assert_eq!(
            handle.state(),
            ConnectionState::Connected { subscribed: true }
        );

        sleep(Duration::from_secs(30)).await;
        assert_eq!(broker.open_count(), 3);
        assert_eq!(handle.subscribe().borrow().connection_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_connect_notifies_once_and_does_not_retry() {
        let broker = MockBroker::default();
        broker.queue(Behaviour::Reject);
        let (handle, _observer, mut rx) = supervised(&broker).await;

        handle.start(alarm_config()).await.unwrap();
        settle().await;
        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Disconnected]);
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                pending_reconnect: false
            }
        );

        sleep(Duration::from_secs(60)).await;
        assert_eq!(broker.open_count(), 1);
        assert!(drain(&mut rx).is_empty());
        assert!(handle
            .subscribe()
            .borrow()
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("rejected")));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_subscription_leaves_session_unsubscribed() {
        let broker = MockBroker::default();
        broker.queue(Behaviour::RefuseSubscribe);
        let (handle, _observer, mut rx) = supervised(&broker).await;

        handle.start(alarm_config()).await.unwrap();
        settle().await;

        assert_eq!(drain(&mut rx), vec![IndicatorEvent::Connected]);
        assert_eq!(
            handle.state(),
            ConnectionState::Connected { subscribed: false }
        );
        assert!(handle
            .subscribe()
            .borrow()
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("subscription refused")));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(broker.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_before_start_is_a_safe_no_op() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;

        let result = handle.reconnect().await;
        assert!(matches!(result, Err(SupervisorError::NotInitialized)));
        settle().await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(broker.open_count(), 0);
        assert_eq!(handle.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_replaces_session_without_duplicate_subscription() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;

        handle.reconnect().await.unwrap();
        settle().await;

        assert_eq!(broker.open_count(), 2);
        assert!(broker.session(0).closed);
        assert!(!broker.session(1).closed);
        assert_eq!(broker.session(0).subscriptions.len(), 1);
        assert_eq!(broker.session(1).subscriptions, vec!["home/alarm".to_string()]);
        assert_eq!(
            drain(&mut rx),
            vec![IndicatorEvent::Connected, IndicatorEvent::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_cancels_pending_retry() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;
        broker.drop_connection();
        settle().await;

        handle.reconnect().await.unwrap();
        assert_eq!(broker.open_count(), 2);
        settle().await;

        sleep(Duration::from_secs(30)).await;
        assert_eq!(broker.open_count(), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                IndicatorEvent::Connected,
                IndicatorEvent::Disconnected,
                IndicatorEvent::Connected
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reconnect_after_rejection_tries_again() {
        let broker = MockBroker::default();
        broker.queue(Behaviour::Reject);
        let (handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;

        handle.reconnect().await.unwrap();
        settle().await;

        assert_eq!(broker.open_count(), 2);
        assert_eq!(
            drain(&mut rx),
            vec![IndicatorEvent::Disconnected, IndicatorEvent::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused() {
        let broker = MockBroker::default();
        let (handle, _observer, _rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();

        let result = handle
            .start(ConnectionConfig::new("other", 1883, "x"))
            .await;
        assert!(matches!(result, Err(SupervisorError::AlreadyStarted)));
        assert_eq!(broker.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_and_foreign_messages_are_dropped() {
        let broker = MockBroker::default();
        let (handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;
        drain(&mut rx);

        broker.publish("home/alarm", &[0xff, 0xfe]);
        broker.publish("home/other", b"red");
        settle().await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(handle.subscribe().borrow().messages_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_observer_leaves_supervisor_running() {
        let broker = MockBroker::default();
        let (handle, observer, rx) = supervised(&broker).await;
        drop(observer);
        drop(rx);

        handle.start(alarm_config()).await.unwrap();
        settle().await;
        broker.drop_connection();
        settle().await;
        sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(broker.open_count(), 2);
        assert_eq!(
            handle.state(),
            ConnectionState::Connected { subscribed: true }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn observer_registration_replaces_previous() {
        let broker = MockBroker::default();
        let (handle, _first, mut first_rx) = supervised(&broker).await;
        let (second, mut second_rx) = ChannelObserver::channel();
        handle.register_observer(&second).await.unwrap();

        handle.start(alarm_config()).await.unwrap();
        settle().await;

        assert!(drain(&mut first_rx).is_empty());
        assert_eq!(drain(&mut second_rx), vec![IndicatorEvent::Connected]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_session_and_cancels_retry() {
        let broker = MockBroker::default();
        let (mut handle, _observer, mut rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;
        broker.drop_connection();
        settle().await;
        drain(&mut rx);

        handle.shutdown().await;
        sleep(Duration::from_secs(30)).await;

        assert_eq!(broker.open_count(), 1);
        assert!(broker.session(0).closed);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                pending_reconnect: false
            }
        );
        assert!(matches!(
            handle.start(alarm_config()).await,
            Err(SupervisorError::ChannelError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_of_live_session_closes_it() {
        let broker = MockBroker::default();
        let (mut handle, _observer, _rx) = supervised(&broker).await;
        handle.start(alarm_config()).await.unwrap();
        settle().await;

        handle.shutdown().await;
        assert!(broker.session(0).closed);
    }
}
