//! # Persistence Module
//!
//! Stores the broker settings between runs.
//!
//! ## Key Abstractions
//! - **StoredSettings**: the on-disk key set (`broker`, `port`, `username`,
//!   `password`, `topic`), each optional so partial files still load
//! - **SettingsStore**: load/save/reset of the TOML file under
//!   `~/.config/mqtt-status-light/`
//!
//! ## Error Handling Strategy
//! File operations use `color_eyre` for context. Conversion into a
//! [`ConnectionConfig`](crate::mqtt::config::ConnectionConfig) reports a typed
//! [`SettingsError`](settings_store::SettingsError), since an incomplete file
//! is an expected state on first run and not an I/O failure.
//!
//! Settings are read once at startup. Changing them means building a new
//! supervisor; a running one never sees updates.

pub mod settings_store;

pub use settings_store::{SettingsError, SettingsStore, StoredSettings};
