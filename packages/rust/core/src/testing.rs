//! Test doubles shared by the stage tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use neuraltheft_collector::ListingSource;
use neuraltheft_lookup::IdentifierResolver;
use neuraltheft_shared::{
    CollectedRecord, EnrichedRecord, HarvestError, LogLevel, Result, RunConfig,
};
use uuid::Uuid;

pub(crate) fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("nt_core_test_{}.db", Uuid::now_v7()))
}

pub(crate) fn run_config(output_path: PathBuf, rate_per_minute: f64) -> RunConfig {
    RunConfig {
        region: "na".into(),
        output_path,
        rate_per_minute,
        credential: "test-token".into(),
        log_level: LogLevel::Debug,
    }
}

pub(crate) fn collected(name: &str) -> CollectedRecord {
    CollectedRecord {
        display_name: name.into(),
        discriminator_tag: "NA1".into(),
        external_handle: format!("{name}_tv"),
    }
}

pub(crate) fn enriched(name: &str) -> EnrichedRecord {
    collected(name).enrich(format!("puuid-{name}"))
}

/// Resolves `name` to `puuid-name`, failing for names listed in `failing`.
#[derive(Default)]
pub(crate) struct FakeResolver {
    pub failing: Vec<String>,
    pub calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl FakeResolver {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentifierResolver for FakeResolver {
    async fn resolve(&self, record: &CollectedRecord) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((record.display_name.clone(), Instant::now()));
        if self.failing.contains(&record.display_name) {
            return Err(HarvestError::lookup(record.to_string(), "unexpected status 404"));
        }
        Ok(format!("puuid-{}", record.display_name))
    }
}

/// A resolver whose lookups never complete.
pub(crate) struct HangingResolver;

#[async_trait]
impl IdentifierResolver for HangingResolver {
    async fn resolve(&self, _record: &CollectedRecord) -> Result<String> {
        std::future::pending().await
    }
}

/// Serves listing pages built from name lists; pages past the end are empty.
pub(crate) struct FakeListing {
    pub pages: Vec<Vec<String>>,
}

impl FakeListing {
    pub fn new(pages: &[&[&str]]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|names| names.iter().map(|n| n.to_string()).collect())
                .collect(),
        }
    }
}

pub(crate) fn listing_html(names: &[String]) -> String {
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr>
                    <td><a href="/valorant/profile/riot/{name}/overview">
                        <span class="v3-trnign">
                            <span class="max-w-full truncate">{name}</span>
                            <span class="v3-trnign__discriminator">#NA1</span>
                        </span>
                    </a></td>
                    <td><a aria-label="Visit twitch profile" href="https://twitch.tv/{name}_tv">tw</a></td>
                </tr>"#
            )
        })
        .collect();
    format!("<html><body><table><tbody>{rows}</tbody></table></body></html>")
}

#[async_trait]
impl ListingSource for FakeListing {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        let names = self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(listing_html(&names))
    }
}
