//! # Status Presentation
//!
//! Turns decoded message payloads into what the indicator shows.
//!
//! ```text
//! status/
//! ├── presenter.rs  - payload → DisplayState mapping (pure)
//! └── render.rs     - DisplayState → terminal output
//! ```
//!
//! The presenter owns no state and knows nothing about the connection. The
//! supervisor's observer decides when it is called; connect and disconnect
//! transitions bypass it and blank the indicator directly.

pub mod presenter;
pub mod render;

pub use presenter::{present, DisplayState, DotColor};
pub use render::{render, Indicator};
