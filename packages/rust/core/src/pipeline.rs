//! End-to-end run: records → batches → worker pool → output file.
//!
//! For the incremental JSON format each batch is appended as soon as it is
//! enriched, and the append of batch N overlaps the enrichment of batch N+1.
//! Only one write is ever in flight and batches land in input order.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use leadfill_shared::{LeadfillError, OutputFormat, Record, Result, RunId};
use leadfill_storage::{BatchWriter, write_json_snapshot, write_table, write_xlsx};

use crate::pool::WorkerPool;

/// Configuration for [`run_enrichment`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Output file.
    pub output_path: PathBuf,
    pub format: OutputFormat,
    /// Records per batch; also the flush granularity for incremental output.
    pub batch_size: usize,
    /// Output columns, in order.
    pub columns: Vec<String>,
    /// Skip records already present in an incremental output file.
    pub resume: bool,
}

/// Result of [`run_enrichment`].
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: RunId,
    pub output_path: PathBuf,
    /// Records given to the run, including resumed ones.
    pub records_total: usize,
    /// Records enriched and written by this run.
    pub records_processed: usize,
    /// Records skipped because the output already had them.
    pub records_resumed: usize,
    pub batches_processed: usize,
    /// Batches appended to the output (incremental format only).
    pub batches_flushed: usize,
    /// Chunks whose worker failed, summed over all batches.
    pub failed_chunks: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a batch is handed to the worker pool.
    fn batch_started(&self, batch: usize, total_batches: usize, records: usize);
    /// Called once a batch is safely on disk.
    fn batch_flushed(&self, batch: usize, total_batches: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_started(&self, _batch: usize, _total_batches: usize, _records: usize) {}
    fn batch_flushed(&self, _batch: usize, _total_batches: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// A batch append running on the blocking pool. The writer travels with the
/// task so there is exactly one owner of the output file.
type PendingWrite = JoinHandle<(BatchWriter, Result<usize>)>;

/// Run the full enrichment over `records`.
///
/// 1. Resume: count records already in the output (incremental format)
/// 2. Enrich batch by batch through the worker pool
/// 3. Persist: append each batch, or write one snapshot at the end
#[instrument(skip_all, fields(output = %config.output_path.display(), format = ?config.format))]
pub async fn run_enrichment(
    config: &RunConfig,
    pool: &WorkerPool,
    records: Vec<Record>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    if config.batch_size == 0 {
        return Err(LeadfillError::validation("batch size must be at least 1"));
    }

    let start = Instant::now();
    let run_id = RunId::new();
    let records_total = records.len();

    info!(
        %run_id,
        records = records_total,
        workers = pool.workers(),
        batch_size = config.batch_size,
        "starting run"
    );

    let mut summary = RunSummary {
        run_id,
        output_path: config.output_path.clone(),
        records_total,
        records_processed: 0,
        records_resumed: 0,
        batches_processed: 0,
        batches_flushed: 0,
        failed_chunks: 0,
        elapsed: Duration::ZERO,
    };

    if config.format.is_incremental() {
        run_incremental(config, pool, records, progress, &mut summary).await?;
    } else {
        run_snapshot(config, pool, records, progress, &mut summary).await?;
    }

    summary.elapsed = start.elapsed();
    progress.done(&summary);

    info!(
        run_id = %summary.run_id,
        processed = summary.records_processed,
        resumed = summary.records_resumed,
        batches = summary.batches_flushed,
        failed_chunks = summary.failed_chunks,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run complete"
    );

    Ok(summary)
}

async fn run_incremental(
    config: &RunConfig,
    pool: &WorkerPool,
    records: Vec<Record>,
    progress: &dyn ProgressReporter,
    summary: &mut RunSummary,
) -> Result<()> {
    progress.phase("Checking output");
    let writer = BatchWriter::new(&config.output_path, config.columns.clone())?;

    // Validates the tail even when not resuming: a damaged file must stop
    // the run before any lookup is made.
    let existing = writer.existing_count()?;
    let resumed = if config.resume {
        existing.min(records.len())
    } else {
        if existing > 0 {
            warn!(existing, "resume disabled, appending after existing records");
        }
        0
    };
    if config.resume && existing > records.len() {
        warn!(existing, input = records.len(), "output has more records than input");
    }
    if resumed > 0 {
        info!(resumed, "resuming after records already written");
    }
    summary.records_resumed = resumed;

    let batches = into_batches(records.into_iter().skip(resumed), config.batch_size);
    let total_batches = batches.len();

    progress.phase("Enriching records");
    let mut writer = Some(writer);
    let mut pending: Option<PendingWrite> = None;
    let mut first_index = resumed;

    for (n, batch) in batches.into_iter().enumerate() {
        progress.batch_started(n + 1, total_batches, batch.len());
        let batch_len = batch.len();
        let enrich = pool.run(batch, first_index);

        let outcome = match pending.take() {
            Some(write) => {
                let (outcome, joined) = tokio::join!(enrich, write);
                writer = Some(settle(config, joined, summary)?);
                progress.batch_flushed(n, total_batches);
                outcome
            }
            None => enrich.await,
        };

        summary.batches_processed += 1;
        summary.failed_chunks += outcome.failed_chunks.len();
        first_index += batch_len;

        let mut owned = writer
            .take()
            .ok_or_else(|| LeadfillError::io(&config.output_path, std::io::Error::other("writer lost")))?;
        let records = outcome.records;
        pending = Some(tokio::task::spawn_blocking(move || {
            let result = owned.append(&records);
            (owned, result)
        }));
    }

    if let Some(write) = pending {
        settle(config, write.await, summary)?;
        progress.batch_flushed(total_batches, total_batches);
    }

    Ok(())
}

/// Collect a finished append and copy the writer's counters into `summary`.
fn settle(
    config: &RunConfig,
    joined: std::result::Result<(BatchWriter, Result<usize>), tokio::task::JoinError>,
    summary: &mut RunSummary,
) -> Result<BatchWriter> {
    let (writer, result) = joined
        .map_err(|e| LeadfillError::io(&config.output_path, std::io::Error::other(e.to_string())))?;
    let written = result?;
    debug!(path = %writer.path().display(), written, "append settled");
    summary.records_processed = writer.records_flushed();
    summary.batches_flushed = writer.batches_flushed();
    Ok(writer)
}

async fn run_snapshot(
    config: &RunConfig,
    pool: &WorkerPool,
    records: Vec<Record>,
    progress: &dyn ProgressReporter,
    summary: &mut RunSummary,
) -> Result<()> {
    let batches = into_batches(records.into_iter(), config.batch_size);
    let total_batches = batches.len();

    progress.phase("Enriching records");
    let mut enriched = Vec::with_capacity(summary.records_total);
    for (n, batch) in batches.into_iter().enumerate() {
        progress.batch_started(n + 1, total_batches, batch.len());
        let outcome = pool.run(batch, enriched.len()).await;
        summary.batches_processed += 1;
        summary.failed_chunks += outcome.failed_chunks.len();
        enriched.extend(outcome.records);
    }

    progress.phase("Writing output");
    match config.format {
        OutputFormat::Table => write_table(&config.output_path, &config.columns, &enriched)?,
        OutputFormat::Xlsx => write_xlsx(&config.output_path, &config.columns, &enriched)?,
        OutputFormat::Json | OutputFormat::JsonSnapshot => {
            write_json_snapshot(&config.output_path, &config.columns, &enriched)?
        }
    }
    summary.records_processed = enriched.len();
    progress.batch_flushed(total_batches, total_batches);
    Ok(())
}

fn into_batches(records: impl Iterator<Item = Record>, size: usize) -> Vec<Vec<Record>> {
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(size);
    for record in records {
        current.push(record);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
