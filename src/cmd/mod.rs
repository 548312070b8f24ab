//! Subcommand implementations.

mod captions;
mod extract;
mod metrics;

pub use captions::cmd_captions;
pub use extract::cmd_extract;
pub use metrics::cmd_metrics;
