//! Foundational low-level utilities shared across DeskLink crates.
//!
//! Provides atomic file-write helpers, time utilities, the shared bridge
//! error taxonomy, and the keyed settings accessor consumed by the GitHub
//! client, the classification pipeline, and the sync runtime.

pub mod atomic_io;
pub mod error;
pub mod settings;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use error::BridgeError;
pub use settings::{keys, FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use time_utils::current_unix_timestamp;
