//! Output formatting helpers for the CLI.
//!
//! Tables for humans, JSON for scripts. Sealed content the session cannot
//! open is shown as a sentinel rather than omitted.

mod json;
mod text;

// Re-export public API
pub use json::{entries_json, entry_json, status_json, sweep_json, tags_json};
pub use text::{
    print_entry, print_entry_list, print_report, print_status, print_sweep, print_tag_list,
    short_id,
};
