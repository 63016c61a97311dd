//! Worker pool: splits a batch into contiguous chunks and enriches them in
//! parallel, one session per chunk.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use leadfill_lookup::SessionFactory;
use leadfill_shared::{Chunk, LeadfillError, Record, Result};

use crate::enrichment::{EnrichmentPipeline, panic_message};

/// Records of one batch after enrichment, in input order.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub records: Vec<Record>,
    /// Chunk indexes whose worker failed; their records are in `records`
    /// with every result field cleared.
    pub failed_chunks: Vec<usize>,
}

/// Fixed-size set of workers sharing one provider pipeline.
pub struct WorkerPool {
    workers: usize,
    sessions: Arc<dyn SessionFactory>,
    pipeline: Arc<EnrichmentPipeline>,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        sessions: Arc<dyn SessionFactory>,
        pipeline: Arc<EnrichmentPipeline>,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(LeadfillError::validation("workers must be at least 1"));
        }
        Ok(Self {
            workers,
            sessions,
            pipeline,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Enrich `batch`, whose first record has run-wide index `first_index`.
    ///
    /// A failing chunk never fails the batch: its records come back with
    /// empty result fields and its index is listed in
    /// [`PoolOutcome::failed_chunks`].
    #[instrument(skip_all, fields(records = batch.len(), workers = self.workers, first_index = first_index))]
    pub async fn run(&self, batch: Vec<Record>, first_index: usize) -> PoolOutcome {
        if batch.is_empty() {
            return PoolOutcome::default();
        }

        let chunks = partition(batch, self.workers, first_index);
        let originals: Vec<Vec<Record>> = chunks.iter().map(|c| c.records.clone()).collect();
        debug!(chunks = chunks.len(), "batch partitioned");

        let mut finished: Vec<(usize, Result<Vec<Record>>)> = Vec::with_capacity(chunks.len());

        if self.workers == 1 {
            for chunk in chunks {
                let index = chunk.index;
                let result = run_chunk(self.sessions.clone(), self.pipeline.clone(), chunk).await;
                finished.push((index, result));
            }
        } else {
            let mut set = JoinSet::new();
            for chunk in chunks {
                let sessions = self.sessions.clone();
                let pipeline = self.pipeline.clone();
                set.spawn(async move {
                    let index = chunk.index;
                    (index, run_chunk(sessions, pipeline, chunk).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(done) => finished.push(done),
                    // The chunk index is lost with the task; the slot stays
                    // empty and is recovered below.
                    Err(e) => error!(error = %e, "worker task aborted"),
                }
            }
        }

        finished.sort_by_key(|(index, _)| *index);
        self.reassemble(finished, originals)
    }

    fn reassemble(
        &self,
        finished: Vec<(usize, Result<Vec<Record>>)>,
        originals: Vec<Vec<Record>>,
    ) -> PoolOutcome {
        let mut slots: Vec<Option<Vec<Record>>> = originals.iter().map(|_| None).collect();

        for (index, result) in finished {
            match result {
                Ok(records) => slots[index] = Some(records),
                Err(e) => error!(chunk = index, error = %e, "chunk failed, records left unenriched"),
            }
        }

        let mut outcome = PoolOutcome::default();
        for (index, (slot, original)) in slots.into_iter().zip(originals).enumerate() {
            match slot {
                Some(records) => outcome.records.extend(records),
                None => {
                    outcome.failed_chunks.push(index);
                    outcome
                        .records
                        .extend(original.iter().map(|r| self.pipeline.cleared(r)));
                }
            }
        }
        outcome
    }
}

/// Split `records` into at most `workers` contiguous chunks of
/// `ceil(len / workers)` records each. The last chunk may be shorter.
pub fn partition(records: Vec<Record>, workers: usize, first_index: usize) -> Vec<Chunk> {
    if records.is_empty() {
        return Vec::new();
    }

    let size = records.len().div_ceil(workers.max(1));
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut rest = records.into_iter().peekable();
    let mut start = first_index;

    while rest.peek().is_some() {
        let records: Vec<Record> = rest.by_ref().take(size).collect();
        let len = records.len();
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            records,
        });
        start += len;
    }
    chunks
}

/// Open a session, enrich the chunk, and close the session on every path.
async fn run_chunk(
    sessions: Arc<dyn SessionFactory>,
    pipeline: Arc<EnrichmentPipeline>,
    chunk: Chunk,
) -> Result<Vec<Record>> {
    let worker = chunk.index;
    let mut session = sessions.open(worker).await?;

    let enriched = AssertUnwindSafe(pipeline.enrich_chunk(session.as_mut(), chunk))
        .catch_unwind()
        .await;

    if let Err(e) = session.close().await {
        warn!(worker, error = %e, "session close failed");
    }

    enriched.map_err(|panic| {
        LeadfillError::Session(format!("worker {worker} {}", panic_message(panic.as_ref())))
    })
}
