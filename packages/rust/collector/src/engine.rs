//! The collector stage: sequential, cancellation-aware pagination.
//!
//! Pages are fetched one at a time starting at page 1. Every valid row is
//! handed downstream before the next page is requested, so the number of
//! outbound requests always equals the number of pages visited.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use neuraltheft_shared::CollectedRecord;
use neuraltheft_shared::handoff::{self, Sent};

use crate::extract::scan_page;
use crate::source::ListingSource;

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `page` had no leaderboard rows.
    Exhausted { page: u32 },
    /// Fetching `page` failed.
    FetchFailed { page: u32 },
    Cancelled,
    /// The enricher stopped receiving.
    DownstreamClosed,
}

/// Summary of a finished collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectStats {
    /// Pages requested, including the terminating one.
    pub pages_visited: u32,
    /// Records handed to the enricher.
    pub records_emitted: usize,
    /// Rows skipped for missing fields.
    pub records_dropped: usize,
    pub stop: StopReason,
}

/// Paginates a [`ListingSource`] and emits [`CollectedRecord`]s.
pub struct Collector<S> {
    source: S,
    output: mpsc::Sender<CollectedRecord>,
    cancel: CancellationToken,
}

impl<S: ListingSource> Collector<S> {
    pub fn new(source: S, output: mpsc::Sender<CollectedRecord>, cancel: CancellationToken) -> Self {
        Self {
            source,
            output,
            cancel,
        }
    }

    /// Run until the listing is exhausted, a fetch fails, or the run is cancelled.
    ///
    /// Consumes the stage; the output sender is dropped on return, which
    /// closes the enricher's input.
    #[instrument(name = "collector", skip_all)]
    pub async fn run(self) -> CollectStats {
        let mut pages_visited = 0;
        let mut records_emitted = 0;
        let mut records_dropped = 0;
        let mut page: u32 = 1;

        let stop = 'pages: loop {
            let fetched =
                match handoff::until_cancelled(&self.cancel, self.source.fetch_page(page)).await {
                    Some(result) => result,
                    None => break StopReason::Cancelled,
                };
            pages_visited += 1;

            let html = match fetched {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, error = %e, "page fetch failed, stopping pagination");
                    break StopReason::FetchFailed { page };
                }
            };

            let scan = scan_page(&html);
            records_dropped += scan.dropped();
            debug!(
                page,
                rows = scan.candidates,
                valid = scan.records.len(),
                "page scanned"
            );

            if scan.is_past_end() {
                info!(page, "no players on page, stopping");
                break StopReason::Exhausted { page };
            }

            for record in scan.records {
                debug!(player = %record, handle = %record.external_handle, "found player");
                match handoff::send(&self.output, record, &self.cancel).await {
                    Sent::Delivered => records_emitted += 1,
                    Sent::Cancelled => break 'pages StopReason::Cancelled,
                    Sent::Closed => break 'pages StopReason::DownstreamClosed,
                }
            }

            page += 1;
        };

        let stats = CollectStats {
            pages_visited,
            records_emitted,
            records_dropped,
            stop,
        };
        info!(
            pages = stats.pages_visited,
            emitted = stats.records_emitted,
            dropped = stats.records_dropped,
            stop = ?stats.stop,
            "collection finished"
        );
        stats
    }
}
