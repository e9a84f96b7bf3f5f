//! Per-item pipeline: stage gating, execution and retry.

mod retry;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use retry::RetryPolicy;
pub use runner::{ItemOutcome, StageOutcome, StageRunner};
