//! Input helper functions for the CLI.

mod input;

// Re-export public API
pub use input::{confirm, env_pin, prompt_new_pin, prompt_pin, read_text, resolve_entry_id};
