//! Broker transport seam.
//!
//! A [`Transport`] opens one session per call and reports everything that
//! happens on it as [`SessionEvent`]s over a channel. The session never
//! reconnects on its own: after a terminal event (`Rejected` or `Lost`) the
//! event stream ends and the supervisor decides what happens next.

use std::fmt;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::config::{ConnectionConfig, SessionOptions};

const EVENT_BUFFER: usize = 100;

/// How long a closing session may take to flush its DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// What a session reports back to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Broker accepted the connection.
    Accepted,
    /// Broker answered the connect with a non-accept code. Terminal.
    Rejected(String),
    /// Broker granted the subscription.
    SubscribeAcked,
    /// Broker answered the subscribe with a failure code.
    SubscribeRefused(String),
    /// Application message, payload not yet decoded.
    Publish { topic: String, payload: Vec<u8> },
    /// Network-level failure. Terminal.
    Lost(String),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Rejected(_) | SessionEvent::Lost(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to queue request: {0}")]
    Request(String),

    #[error("Session already closed")]
    Closed,
}

/// Requests the supervisor can make on an open session.
pub trait SessionControl: Send {
    /// Queues a subscribe request at QoS 0.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Closes the session. Further events are not delivered.
    fn close(&mut self);
}

/// An opened session: its event stream and its control handle.
pub struct SessionLink {
    pub events: mpsc::Receiver<SessionEvent>,
    pub control: Box<dyn SessionControl>,
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLink").finish_non_exhaustive()
    }
}

pub trait Transport: Send + Sync + 'static {
    /// Starts connecting a new session. Must be called inside a tokio runtime.
    fn open(&self, config: &ConnectionConfig, options: &SessionOptions) -> SessionLink;
}

/// MQTT 3.1.1 transport backed by `rumqttc`.
#[derive(Clone, Debug)]
pub struct RumqttcTransport {
    request_capacity: usize,
}

impl Default for RumqttcTransport {
    fn default() -> Self {
        Self {
            request_capacity: 10,
        }
    }
}

impl Transport for RumqttcTransport {
    fn open(&self, config: &ConnectionConfig, options: &SessionOptions) -> SessionLink {
        let mut mqtt_options =
            MqttOptions::new(options.client_id.clone(), config.host.clone(), config.port);
        mqtt_options
            .set_clean_session(options.clean_session)
            .set_keep_alive(options.keep_alive);
        if let Some(user) = &config.username {
            mqtt_options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, self.request_capacity);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(drive_event_loop(eventloop, event_tx));

        SessionLink {
            events: event_rx,
            control: Box::new(RumqttcSession {
                client,
                task: Some(task),
            }),
        }
    }
}

/// Polls the rumqttc event loop until the first terminal event.
///
/// rumqttc reconnects on the next `poll` after an error; stopping here keeps
/// the reconnect policy with the supervisor.
async fn drive_event_loop(mut eventloop: EventLoop, events: mpsc::Sender<SessionEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => match ack.code {
                ConnectReturnCode::Success => SessionEvent::Accepted,
                code => SessionEvent::Rejected(format!("{:?}", code)),
            },
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                match ack
                    .return_codes
                    .iter()
                    .find(|code| !matches!(code, SubscribeReasonCode::Success(_)))
                {
                    None => SessionEvent::SubscribeAcked,
                    Some(code) => SessionEvent::SubscribeRefused(format!("{:?}", code)),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => SessionEvent::Publish {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT flushed, stopping event loop");
                break;
            }
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) => {
                SessionEvent::Rejected(format!("{:?}", code))
            }
            Err(e) => SessionEvent::Lost(e.to_string()),
        };

        let terminal = event.is_terminal();
        if events.send(event).await.is_err() {
            debug!("Session owner gone, stopping event loop");
            break;
        }
        if terminal {
            break;
        }
    }
}

struct RumqttcSession {
    client: AsyncClient,
    task: Option<JoinHandle<()>>,
}

impl SessionControl for RumqttcSession {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.task.is_none() {
            return Err(TransportError::Closed);
        }
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not queued: {}", e);
            task.abort();
            return;
        }

        // The event loop ends on its own once DISCONNECT is on the wire.
        let abort = task.abort_handle();
        tokio::spawn(async move {
            if timeout(DISCONNECT_GRACE, task).await.is_err() {
                debug!("DISCONNECT not flushed in time, aborting event loop");
                abort.abort();
            }
        });
    }
}

impl Drop for RumqttcSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Session dropped without close, aborting its event loop");
            task.abort();
        }
    }
}
