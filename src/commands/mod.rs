//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod errors;
pub mod play;
pub mod serve;
pub mod stats;

// Re-export commonly used types
pub use errors::run as errors_run;
pub use play::{run as play_run, PlayArgs};
pub use serve::run as serve_run;
pub use stats::run as stats_run;
