//! # MQTT Integration Module
//!
//! Keeps exactly one subscription to a broker topic alive for as long as the
//! process runs, and reports connection and message events to a single
//! observer.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Connection parameters and protocol constants
//! ├── topics.rs           - Subscription filter matching
//! ├── message_manager.rs  - Payload decoding
//! ├── transport.rs        - Transport seam and the rumqttc implementation
//! ├── session.rs          - Per-session phases (statum)
//! ├── observer.rs         - Weak observer link and channel forwarding
//! └── supervisor.rs       - Lifecycle actor and reconnect policy
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Transport ─[SessionEvent]→ Supervisor ─[IndicatorEvent]→ Observer ─→ presenter
//!                                ▲
//!              SupervisorHandle ─┘ (start / reconnect / teardown)
//! ```
//!
//! ## Design Notes
//!
//! - **Single owner**: connection state is only touched inside the supervisor
//!   task, so concurrent `reconnect()` calls and disconnect events cannot
//!   produce a second session
//! - **Fixed retry**: a transport loss schedules one reconnect after 5 seconds,
//!   forever; a broker that rejects the connect is not retried automatically
//! - **Clean sessions**: every attempt starts with a clean session and
//!   re-subscribes, so a replaced session leaves nothing behind on the broker

pub mod config;
pub mod message_manager;
pub mod observer;
pub mod session;
pub mod supervisor;
pub mod topics;
pub mod transport;
