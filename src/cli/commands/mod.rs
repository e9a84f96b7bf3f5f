//! CLI command implementations.

mod config;
mod init;
mod report;
mod run;
mod status;

pub use config::run_config;
pub use init::run_init;
pub use report::run_report;
pub use run::run_batch;
pub use status::run_status;
