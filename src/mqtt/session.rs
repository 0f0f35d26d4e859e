//! One broker session with compile-time phase safety via statum
//!
//! ```text
//! Connecting ──(ConnAck accepted, subscribe queued)──► Live
//! ```
//!
//! Only a `Live` session hands out application messages, so nothing is
//! delivered before the subscribe request has been issued.

use statum::{machine, state};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::config::{ConnectionConfig, SessionOptions};
use super::message_manager::StatusMessage;
use super::topics::TopicFilter;
use super::transport::{SessionControl, SessionEvent, Transport, TransportError};

#[state]
#[derive(Debug, Clone)]
pub enum SessionPhase {
    Connecting, // Waiting for the broker's ConnAck
    Live,       // Accepted, subscription requested
}

#[machine]
pub struct Session<S: SessionPhase> {
    control: Box<dyn SessionControl>,
    filter: TopicFilter,
    attempt: u64,
}

impl<S: SessionPhase> Session<S> {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Closes the underlying transport session.
    pub fn close(mut self) {
        debug!("Closing session #{}", self.attempt);
        self.control.close();
    }
}

impl Session<Connecting> {
    /// Opens a new transport session for `config.topic`.
    pub fn open(
        transport: &impl Transport,
        config: &ConnectionConfig,
        options: &SessionOptions,
        attempt: u64,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let link = transport.open(config, options);
        let session = Self::new(link.control, TopicFilter::new(config.topic.clone()), attempt);
        (session, link.events)
    }

    /// Issues the subscribe request and transitions to `Live`.
    pub fn establish(mut self) -> Result<Session<Live>, TransportError> {
        self.control.subscribe(self.filter.as_str())?;
        info!("Subscribed to '{}' (session #{})", self.filter, self.attempt);
        Ok(self.transition())
    }
}

impl Session<Live> {
    /// Decodes an inbound publish. Returns `None` when the topic is not ours
    /// or the payload is not text.
    pub fn accept(&self, topic: &str, payload: &[u8]) -> Option<StatusMessage> {
        if !self.filter.matches(topic) {
            debug!("Ignoring message on unsubscribed topic '{}'", topic);
            return None;
        }
        let message = StatusMessage::decode(topic, payload);
        if message.is_none() {
            debug!("Dropping non-text payload ({} bytes) on '{}'", payload.len(), topic);
        }
        message
    }
}
