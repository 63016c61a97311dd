//! Durable output and input loading for leadfill.
//!
//! - [`AppendableContainer`]: a JSON list on disk that stays parseable after every append
//! - [`BatchWriter`]: column projection and batch-at-a-time flushing on top of it
//! - [`write_json_snapshot`] / [`write_table`] / [`write_xlsx`]: whole-run, non-incremental outputs
//! - [`load_input`]: registry exports, flat JSON lists, and CSV tables
//!
//! The output file has a single writer: callers never issue concurrent appends.

pub mod container;
pub mod input;
pub mod snapshot;
pub mod writer;

pub use container::{AppendableContainer, ContainerState};
pub use input::{load_input, load_json, load_table};
pub use snapshot::{write_json_snapshot, write_table, write_xlsx};
pub use writer::{BatchWriter, ProjectedRecord};
