//! Command implementations for the CLI.

mod config;
mod scan;
mod stream;

pub use config::cmd_config;
pub use scan::cmd_scan;
pub use stream::cmd_stream;
