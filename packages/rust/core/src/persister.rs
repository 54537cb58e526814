//! The persister stage: batched, idempotent writes of enriched records.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use neuraltheft_shared::handoff::{self, Received};
use neuraltheft_shared::{EnrichedRecord, Result, RunConfig};
use neuraltheft_storage::{InsertOutcome, Storage};

use crate::pipeline::{ProgressReporter, SilentProgress};

/// Successful insert statements per transaction.
pub const BATCH_SIZE: usize = 10;

/// Summary of a finished persistence stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// New rows written and committed (or pending in the final commit).
    pub persisted: usize,
    /// Records whose identifier was already stored.
    pub duplicates: usize,
    /// Records whose insert statement failed.
    pub failed: usize,
    /// Transactions committed, including the final one.
    pub commits: usize,
    pub cancelled: bool,
}

/// Owns the output database for the duration of a run.
pub struct Persister {
    output_path: PathBuf,
    input: mpsc::Receiver<EnrichedRecord>,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressReporter>,
}

impl Persister {
    pub fn new(
        config: &RunConfig,
        input: mpsc::Receiver<EnrichedRecord>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            output_path: config.output_path.clone(),
            input,
            cancel,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Store records until the enricher finishes or the run is cancelled.
    ///
    /// Failing to open the database or to begin or commit a transaction is
    /// fatal. On cancellation the open transaction is rolled back; batches
    /// committed before that stay on disk.
    #[instrument(name = "persister", skip_all, fields(output = %self.output_path.display()))]
    pub async fn run(mut self) -> Result<PersistStats> {
        let storage = Storage::open(&self.output_path).await?;
        let mut stats = PersistStats::default();
        let mut batch = storage.begin_batch().await?;

        loop {
            let record = match handoff::recv(&mut self.input, &self.cancel).await {
                Received::Item(record) => record,
                Received::Cancelled => {
                    let discarded = batch.pending();
                    if let Err(e) = batch.rollback().await {
                        warn!(error = %e, "rollback of open batch failed");
                    }
                    info!(discarded, "run cancelled, open batch rolled back");
                    stats.cancelled = true;
                    break;
                }
                Received::Closed => {
                    batch.commit().await?;
                    stats.commits += 1;
                    self.progress.batch_committed(stats.commits);
                    break;
                }
            };

            match batch.insert(&record).await {
                Ok(InsertOutcome::Inserted) => stats.persisted += 1,
                Ok(InsertOutcome::Duplicate) => {
                    debug!(player = %record, "identifier already stored");
                    stats.duplicates += 1;
                }
                Err(e) => {
                    warn!(
                        player = %record,
                        identifier = %record.identifier,
                        error = %e,
                        "insert failed, skipping player"
                    );
                    stats.failed += 1;
                    continue;
                }
            }
            self.progress
                .record_persisted(&record, stats.persisted + stats.duplicates);

            if batch.pending() >= BATCH_SIZE {
                batch.commit().await?;
                stats.commits += 1;
                debug!(commits = stats.commits, "batch committed");
                self.progress.batch_committed(stats.commits);
                batch = storage.begin_batch().await?;
            }
        }

        info!(
            persisted = stats.persisted,
            duplicates = stats.duplicates,
            failed = stats.failed,
            commits = stats.commits,
            cancelled = stats.cancelled,
            "persistence finished"
        );
        Ok(stats)
    }
}
