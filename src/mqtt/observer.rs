//! Observer link between the supervisor and the presentation side.
//!
//! The supervisor never owns its observer. It keeps a [`Weak`] handle and
//! upgrades it for each notification; once the observer is dropped every
//! notification becomes a no-op.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::status::presenter::{self, DisplayState};

/// Receives connection and message events. Calls are never concurrent.
pub trait StatusObserver: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self);
    fn on_message(&self, text: &str);
}

/// Event as seen by the presentation context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndicatorEvent {
    Connected,
    Disconnected,
    Message(String),
}

impl IndicatorEvent {
    /// Connect and disconnect blank the indicator; messages go through the presenter.
    pub fn display_state(&self) -> DisplayState {
        match self {
            IndicatorEvent::Connected | IndicatorEvent::Disconnected => DisplayState::Hidden,
            IndicatorEvent::Message(text) => presenter::present(text),
        }
    }
}

/// Non-owning slot for the single registered observer.
#[derive(Default)]
pub struct ObserverSlot {
    observer: Option<Weak<dyn StatusObserver>>,
}

impl ObserverSlot {
    /// Replaces any previously registered observer.
    pub fn register(&mut self, observer: Weak<dyn StatusObserver>) {
        if self.observer.is_some() {
            debug!("Replacing registered observer");
        }
        self.observer = Some(observer);
    }

    /// Delivers `event`. Returns false if no live observer received it.
    pub fn notify(&self, event: &IndicatorEvent) -> bool {
        let Some(observer) = self.observer.as_ref().and_then(|weak| weak.upgrade()) else {
            debug!("No live observer for {:?}", event);
            return false;
        };
        match event {
            IndicatorEvent::Connected => observer.on_connected(),
            IndicatorEvent::Disconnected => observer.on_disconnected(),
            IndicatorEvent::Message(text) => observer.on_message(text),
        }
        true
    }
}

/// Forwards events to the task that owns presentation state.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<IndicatorEvent>,
}

impl ChannelObserver {
    /// Creates the observer together with the receiving end for the presentation task.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<IndicatorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }

    fn forward(&self, event: IndicatorEvent) {
        if self.sender.send(event).is_err() {
            debug!("Presentation side closed, dropping indicator event");
        }
    }
}

impl StatusObserver for ChannelObserver {
    fn on_connected(&self) {
        self.forward(IndicatorEvent::Connected);
    }

    fn on_disconnected(&self) {
        self.forward(IndicatorEvent::Disconnected);
    }

    fn on_message(&self, text: &str) {
        self.forward(IndicatorEvent::Message(text.to_string()));
    }
}
