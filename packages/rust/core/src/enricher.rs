//! The enricher stage: one rate-limited identifier lookup per collected record.
//!
//! Records are processed strictly in arrival order. A failed lookup drops
//! that record only; it is never retried.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use neuraltheft_lookup::IdentifierResolver;
use neuraltheft_shared::handoff::{self, Received, Sent};
use neuraltheft_shared::{CollectedRecord, EnrichedRecord, HarvestError, Result, RunConfig};

use crate::pipeline::{ProgressReporter, SilentProgress};

/// Summary of a finished enrichment stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    /// Records taken from the collector.
    pub received: usize,
    /// Records resolved and handed to the persister.
    pub resolved: usize,
    /// Records dropped because the lookup failed.
    pub failed: usize,
    pub cancelled: bool,
}

/// Direct (unkeyed) limiter shared by every lookup of a run.
pub type LookupLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket admitting one lookup per `60 / rate_per_minute` seconds, burst 1.
pub fn lookup_limiter(config: &RunConfig) -> Result<LookupLimiter> {
    let quota = Quota::with_period(config.rate_period()?)
        .ok_or_else(|| HarvestError::validation("lookup rate period must be non-zero"))?
        .allow_burst(NonZeroU32::MIN);
    Ok(RateLimiter::direct(quota))
}

/// Resolves identifiers for collected records and forwards the hits.
pub struct Enricher<R> {
    resolver: R,
    limiter: LookupLimiter,
    input: mpsc::Receiver<CollectedRecord>,
    output: mpsc::Sender<EnrichedRecord>,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressReporter>,
}

impl<R: IdentifierResolver> Enricher<R> {
    pub fn new(
        config: &RunConfig,
        resolver: R,
        input: mpsc::Receiver<CollectedRecord>,
        output: mpsc::Sender<EnrichedRecord>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            resolver,
            limiter: lookup_limiter(config)?,
            input,
            output,
            cancel,
            progress: Arc::new(SilentProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Run until the collector finishes, the persister goes away, or the run is cancelled.
    #[instrument(name = "enricher", skip_all)]
    pub async fn run(mut self) -> EnrichStats {
        let mut stats = EnrichStats::default();

        loop {
            let record = match handoff::recv(&mut self.input, &self.cancel).await {
                Received::Item(record) => record,
                Received::Cancelled => {
                    stats.cancelled = true;
                    break;
                }
                Received::Closed => break,
            };
            stats.received += 1;

            if handoff::until_cancelled(&self.cancel, self.limiter.until_ready())
                .await
                .is_none()
            {
                stats.cancelled = true;
                break;
            }

            let lookup = handoff::until_cancelled(&self.cancel, self.resolver.resolve(&record)).await;
            let identifier = match lookup {
                None => {
                    stats.cancelled = true;
                    break;
                }
                Some(Ok(identifier)) => identifier,
                Some(Err(e)) => {
                    warn!(
                        player = %record,
                        handle = %record.external_handle,
                        error = %e,
                        "identifier lookup failed, dropping player"
                    );
                    stats.failed += 1;
                    self.progress.lookup_failed(&record, &e);
                    continue;
                }
            };

            let enriched = record.enrich(identifier);
            debug!(player = %enriched, "identifier resolved");
            self.progress.record_enriched(&enriched);

            match handoff::send(&self.output, enriched, &self.cancel).await {
                Sent::Delivered => stats.resolved += 1,
                Sent::Cancelled => {
                    stats.cancelled = true;
                    break;
                }
                Sent::Closed => {
                    warn!("persister stopped receiving, ending enrichment");
                    break;
                }
            }
        }

        info!(
            received = stats.received,
            resolved = stats.resolved,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "enrichment finished"
        );
        stats
    }
}
