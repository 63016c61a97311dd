//! Batch writer: column projection on top of the appendable container.

use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{info, instrument};

use leadfill_shared::{LeadfillError, Record, Result};

use crate::container::{AppendableContainer, ContainerState};

/// A record reduced to a fixed, ordered set of keys.
///
/// Missing fields serialize as `""`; no key is ever omitted.
pub struct ProjectedRecord<'a> {
    columns: &'a [String],
    record: &'a Record,
}

impl<'a> ProjectedRecord<'a> {
    pub fn new(columns: &'a [String], record: &'a Record) -> Self {
        Self { columns, record }
    }
}

impl Serialize for ProjectedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(column, self.record.get(column))?;
        }
        map.end()
    }
}

/// Persists successive batches into one JSON list.
///
/// A batch is either fully appended or not at all; the file parses after
/// every successful [`BatchWriter::append`].
#[derive(Debug)]
pub struct BatchWriter {
    container: AppendableContainer,
    columns: Vec<String>,
    batches_flushed: usize,
    records_flushed: usize,
}

impl BatchWriter {
    /// Create a writer for `path` projecting onto `columns`.
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(LeadfillError::validation("output columns must not be empty"));
        }
        Ok(Self {
            container: AppendableContainer::new(path),
            columns,
            batches_flushed: 0,
            records_flushed: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.container.path()
    }

    /// Batches appended by this writer instance.
    pub fn batches_flushed(&self) -> usize {
        self.batches_flushed
    }

    /// Records appended by this writer instance.
    pub fn records_flushed(&self) -> usize {
        self.records_flushed
    }

    /// Number of elements already present in the output file.
    ///
    /// Validates the tail first so a damaged file is reported the same way an
    /// append would report it.
    pub fn existing_count(&self) -> Result<usize> {
        match self.container.inspect()? {
            ContainerState::Absent | ContainerState::Empty => Ok(0),
            ContainerState::Closed {
                has_elements: false,
            } => Ok(0),
            ContainerState::Closed { has_elements: true } => Ok(self
                .container
                .read_all::<serde_json::Value>()?
                .len()),
        }
    }

    /// Append one batch. An empty batch leaves the file unchanged.
    #[instrument(skip_all, fields(path = %self.path().display(), records = batch.len()))]
    pub fn append(&mut self, batch: &[Record]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let elements = batch
            .iter()
            .map(|record| {
                serde_json::to_string_pretty(&ProjectedRecord::new(&self.columns, record))
                    .map_err(|e| LeadfillError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        self.container.append(&elements)?;

        self.batches_flushed += 1;
        self.records_flushed += batch.len();

        info!(
            batch = self.batches_flushed,
            total_records = self.records_flushed,
            "batch flushed"
        );

        Ok(batch.len())
    }
}
