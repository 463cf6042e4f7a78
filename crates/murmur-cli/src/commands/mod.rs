//! Command handlers, one module per command group.

mod entries;
mod init;
mod maintenance;
mod tags;

pub use entries::{handle_add, handle_enrich, handle_list, handle_show};
pub use init::handle_init;
pub use maintenance::{handle_check, handle_status, handle_sweep};
pub use tags::handle_tag;
