//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod models;
pub mod rebuild;
pub mod utils;

// Re-export main command functions
pub use models::RebuildArgs;
pub use rebuild::{execute_rebuild, validate_args};
pub use utils::{display_events, display_version, inspect_snapshot_file};
