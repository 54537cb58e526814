//! Leaderboard collection: listing source, row extraction, and the collector stage.
//!
//! This crate provides:
//! - [`source`] — the [`ListingSource`] seam and its HTTP implementation
//! - [`extract`] — tracker.gg row extraction ([`scan_page`])
//! - [`engine`] — the [`Collector`] pipeline stage

pub mod engine;
pub mod extract;
pub mod source;

pub use engine::{CollectStats, Collector, StopReason};
pub use extract::{PageScan, scan_page};
pub use source::{DEFAULT_LISTING_BASE, HttpListingSource, ListingSource, listing_client};

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    // -----------------------------------------------------------------------
    // Fixture extraction tests
    // -----------------------------------------------------------------------

    #[test]
    fn fixture_page_rows() {
        let scan = scan_page(&load_fixture("leaderboard_page.html"));
        assert_eq!(scan.candidates, 4);

        let players: Vec<(String, String, String)> = scan
            .records
            .iter()
            .map(|r| {
                (
                    r.display_name.clone(),
                    r.discriminator_tag.clone(),
                    r.external_handle.clone(),
                )
            })
            .collect();
        assert_eq!(
            players,
            vec![
                ("TenZ".into(), "0505".into(), "tenz".into()),
                ("Demon1".into(), "Eggw".into(), "demon1".into()),
                ("aspas".into(), "mibr".into(), "aspaszin".into()),
            ]
        );
    }

    #[test]
    fn fixture_page_drops_row_without_twitch() {
        let scan = scan_page(&load_fixture("leaderboard_page.html"));
        assert_eq!(scan.dropped(), 1);
        assert!(scan.records.iter().all(|r| r.display_name != "Quiet"));
    }

    #[test]
    fn fixture_empty_page_is_past_end() {
        let scan = scan_page(&load_fixture("leaderboard_empty.html"));
        assert!(scan.is_past_end());
    }

    // -----------------------------------------------------------------------
    // End-to-end against a mock server
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn collect_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::query_param("page", "1"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(load_fixture("leaderboard_page.html")),
            )
            .expect(1)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::query_param("page", "2"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(load_fixture("leaderboard_empty.html")),
            )
            .expect(1)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::query_param("page", "3"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(listing_client().unwrap(), "na")
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let (tx, mut rx) = mpsc::channel(8);
        let stats = Collector::new(source, tx, CancellationToken::new())
            .run()
            .await;

        assert_eq!(stats.pages_visited, 2);
        assert_eq!(stats.records_emitted, 3);
        assert_eq!(stats.records_dropped, 1);
        assert_eq!(stats.stop, StopReason::Exhausted { page: 2 });

        let mut handles = Vec::new();
        while let Some(record) = rx.recv().await {
            handles.push(record.external_handle);
        }
        assert_eq!(handles, vec!["tenz", "demon1", "aspaszin"]);

        server.verify().await;
    }
}
