//! Application-level utilities for the Murmur CLI.
//!
//! This module provides:
//! - Path resolution for config and journal files
//! - The application context (config, journal, secret backend)
//! - PIN handling with retry logic

mod context;
mod pin;
mod resolver;

// Re-export public API
pub use context::{open_secret_store, AppContext};
pub use pin::{unlock_tags, with_pin_retry};
pub use resolver::resolve_config_path;
