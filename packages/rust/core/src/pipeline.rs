//! End-to-end harvest: listing pages → identifier lookups → database.
//!
//! The three stages run as separate tokio tasks joined by bounded channels.
//! They share nothing but a cancellation token derived from the caller's.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, instrument};

use neuraltheft_collector::{CollectStats, Collector, HttpListingSource, ListingSource, listing_client};
use neuraltheft_lookup::{HttpIdentifierResolver, IdentifierResolver, lookup_client};
use neuraltheft_shared::{
    CollectedRecord, EnrichedRecord, HarvestError, Result, RunConfig, RunId,
};

use crate::enricher::{EnrichStats, Enricher};
use crate::persister::{PersistStats, Persister};

/// Capacity of the enricher → persister handoff.
const PERSIST_QUEUE: usize = 1;

/// Outcome of a finished (or cancelled) harvest.
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub collect: CollectStats,
    pub enrich: EnrichStats,
    pub persist: PersistStats,
    /// The caller's token fired before the stages drained.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Progress callbacks for a running harvest. Every method defaults to a no-op.
pub trait ProgressReporter: Send + Sync {
    /// An identifier was resolved.
    fn record_enriched(&self, _record: &EnrichedRecord) {}
    /// A lookup failed and the record was dropped.
    fn lookup_failed(&self, _record: &CollectedRecord, _error: &HarvestError) {}
    /// A record was written (or found already stored); `stored` is the running total.
    fn record_persisted(&self, _record: &EnrichedRecord, _stored: usize) {}
    /// A transaction was committed; `commits` is the running total.
    fn batch_committed(&self, _commits: usize) {}
    /// The harvest completed.
    fn done(&self, _summary: &HarvestSummary) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

/// Run a harvest against the production listing and lookup hosts.
pub async fn harvest(
    config: &RunConfig,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressReporter>,
) -> Result<HarvestSummary> {
    config.validate()?;
    let source = HttpListingSource::from_config(listing_client()?, config)?;
    let resolver = HttpIdentifierResolver::from_config(lookup_client()?, config)?;
    run_harvest(config, source, resolver, cancel, progress).await
}

/// Run the three stages to completion over the given adapters.
///
/// Returns once every stage has exited, including the persister's final
/// commit or rollback. A fatal persister error cancels the remaining stages
/// and is returned after they unwind.
#[instrument(name = "harvest", skip_all, fields(region = %config.region))]
pub async fn run_harvest<S, R>(
    config: &RunConfig,
    source: S,
    resolver: R,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressReporter>,
) -> Result<HarvestSummary>
where
    S: ListingSource + 'static,
    R: IdentifierResolver + 'static,
{
    config.validate()?;
    let run_id = RunId::new();
    let started_at = Utc::now();
    let start = Instant::now();

    info!(
        %run_id,
        output = %config.output_path.display(),
        rate_per_minute = config.rate_per_minute,
        "starting harvest"
    );

    let stages = cancel.child_token();
    let (collected_tx, collected_rx) = mpsc::channel(config.lookahead_capacity());
    let (enriched_tx, enriched_rx) = mpsc::channel(PERSIST_QUEUE);

    let collector = Collector::new(source, collected_tx, stages.clone());
    let enricher = Enricher::new(config, resolver, collected_rx, enriched_tx, stages.clone())?
        .with_progress(progress.clone());
    let persister =
        Persister::new(config, enriched_rx, stages.clone()).with_progress(progress.clone());

    let persist_task = tokio::spawn(
        {
            let stages = stages.clone();
            async move {
                let result = persister.run().await;
                if result.is_err() {
                    stages.cancel();
                }
                result
            }
        }
        .in_current_span(),
    );
    let enrich_task = tokio::spawn(enricher.run().in_current_span());
    let collect_task = tokio::spawn(collector.run().in_current_span());

    let (collect, enrich, persist) = tokio::join!(collect_task, enrich_task, persist_task);

    let persist = persist.map_err(|e| stage_failed("persister", e))??;
    let enrich = enrich.map_err(|e| stage_failed("enricher", e))?;
    let collect = collect.map_err(|e| stage_failed("collector", e))?;

    let summary = HarvestSummary {
        run_id,
        started_at,
        collect,
        enrich,
        persist,
        cancelled: cancel.is_cancelled(),
        elapsed: start.elapsed(),
    };

    info!(
        %run_id,
        pages = summary.collect.pages_visited,
        collected = summary.collect.records_emitted,
        resolved = summary.enrich.resolved,
        lookup_failures = summary.enrich.failed,
        persisted = summary.persist.persisted,
        duplicates = summary.persist.duplicates,
        cancelled = summary.cancelled,
        elapsed_ms = summary.elapsed.as_millis(),
        "harvest complete"
    );
    progress.done(&summary);

    Ok(summary)
}

fn stage_failed(stage: &str, err: JoinError) -> HarvestError {
    HarvestError::Task(format!("{stage}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use neuraltheft_collector::StopReason;
    use neuraltheft_storage::Storage;
    use url::Url;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::{FakeListing, FakeResolver, listing_html, run_config, temp_db_path};

    #[derive(Default)]
    struct RecordingProgress {
        stored: Mutex<Vec<usize>>,
        finished: Mutex<Option<HarvestSummary>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn record_persisted(&self, _record: &EnrichedRecord, stored: usize) {
            self.stored.lock().unwrap().push(stored);
        }

        fn done(&self, summary: &HarvestSummary) {
            *self.finished.lock().unwrap() = Some(summary.clone());
        }
    }

    #[tokio::test]
    async fn harvests_every_page_into_storage() {
        let path = temp_db_path();
        let config = run_config(path.clone(), 60_000.0);
        let source = FakeListing::new(&[&["a", "b", "c"], &["d", "gone", "e"]]);
        let resolver = FakeResolver::failing(&["gone"]);
        let progress = Arc::new(RecordingProgress::default());

        let summary = run_harvest(
            &config,
            source,
            resolver,
            CancellationToken::new(),
            progress.clone(),
        )
        .await
        .unwrap();

        assert_eq!(summary.collect.pages_visited, 3);
        assert_eq!(summary.collect.stop, StopReason::Exhausted { page: 3 });
        assert_eq!(summary.collect.records_emitted, 6);
        assert_eq!(summary.enrich.failed, 1);
        assert_eq!(summary.persist.persisted, 5);
        assert!(!summary.cancelled);

        assert_eq!(*progress.stored.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(progress.finished.lock().unwrap().is_some());

        let names: Vec<String> = Storage::open(&path)
            .await
            .unwrap()
            .list_players()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn rejects_invalid_config_before_starting() {
        let config = run_config(temp_db_path(), 0.0);
        let err = run_harvest(
            &config,
            FakeListing::new(&[]),
            FakeResolver::default(),
            CancellationToken::new(),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Validation { .. }));
    }

    #[tokio::test]
    async fn out_of_range_rates_fail_validation() {
        for rate in [1e19, 1e-20] {
            let config = run_config(temp_db_path(), rate);
            let result = run_harvest(
                &config,
                FakeListing::new(&[&["a"]]),
                FakeResolver::default(),
                CancellationToken::new(),
                Arc::new(SilentProgress),
            )
            .await;
            assert!(
                matches!(result, Err(HarvestError::Validation { .. })),
                "rate {rate} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn cancelled_run_still_returns_summary() {
        let path = temp_db_path();
        // 1/min: after the first lookup the enricher waits on the limiter.
        let config = run_config(path.clone(), 1.0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run_harvest(
                &config,
                FakeListing::new(&[&["a", "b", "c"]]),
                FakeResolver::default(),
                cancel,
                Arc::new(SilentProgress),
            ),
        )
        .await
        .expect("harvest did not unwind")
        .unwrap();

        assert!(summary.cancelled);
        assert!(summary.enrich.cancelled);
        assert!(summary.persist.cancelled);
        // The single stored record sat in the open batch and was rolled back.
        let storage = Storage::open(&path).await.unwrap();
        assert_eq!(storage.count_players().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn storage_failure_unwinds_other_stages() {
        let dir = std::env::temp_dir().join(format!("nt_dir_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = run_config(dir.clone(), 1.0);
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_harvest(
                &config,
                FakeListing::new(&[&["a", "b", "c"]]),
                FakeResolver::default(),
                cancel.clone(),
                Arc::new(SilentProgress),
            ),
        )
        .await
        .expect("harvest did not unwind");

        assert!(result.is_err());
        // The caller's token is left alone.
        assert!(!cancel.is_cancelled());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn harvest_against_mock_hosts() {
        let server = MockServer::start().await;
        let page_one: Vec<String> = vec!["TenZ".into(), "Ghost".into(), "Zekken".into()];

        Mock::given(method("GET"))
            .and(path("/valorant/leaderboards/ranked/all/default"))
            .and(query_param("region", "na"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&page_one)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/valorant/leaderboards/ranked/all/default"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&[])))
            .expect(1)
            .mount(&server)
            .await;

        for name in ["TenZ", "Zekken"] {
            Mock::given(method("GET"))
                .and(path(format!("/valorant/v1/account/{name}/NA1")))
                .and(header("authorization", "Bearer test-token"))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    r#"{{"status":200,"data":{{"puuid":"puuid-{name}"}}}}"#
                )))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/valorant/v1/account/Ghost/NA1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let path_db = temp_db_path();
        let config = run_config(path_db.clone(), 60_000.0);
        let source = HttpListingSource::from_config(listing_client().unwrap(), &config)
            .unwrap()
            .with_base_url(base.clone());
        let resolver = HttpIdentifierResolver::from_config(lookup_client().unwrap(), &config)
            .unwrap()
            .with_base_url(base);

        let summary = run_harvest(
            &config,
            source,
            resolver,
            CancellationToken::new(),
            Arc::new(SilentProgress),
        )
        .await
        .unwrap();

        assert_eq!(summary.collect.records_emitted, 3);
        assert_eq!(summary.enrich.failed, 1);
        assert_eq!(summary.persist.persisted, 2);
        assert_eq!(summary.persist.commits, 1);

        let storage = Storage::open(&path_db).await.unwrap();
        let stored = storage.get_player("puuid-Zekken").await.unwrap().unwrap();
        assert_eq!(stored.display_name, "Zekken");
        assert_eq!(stored.discriminator_tag, "NA1");
        assert_eq!(stored.external_handle, "Zekken_tv");

        server.verify().await;
    }
}
