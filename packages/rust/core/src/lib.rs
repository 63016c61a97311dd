//! Core run orchestration for leadfill.
//!
//! This crate ties the lookup providers, the worker pool, and the output
//! writers into one end-to-end run (`run_enrichment`).

pub mod enrichment;
pub mod pipeline;
pub mod pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use enrichment::EnrichmentPipeline;
pub use pipeline::{ProgressReporter, RunConfig, RunSummary, SilentProgress, run_enrichment};
pub use pool::{PoolOutcome, WorkerPool, partition};
