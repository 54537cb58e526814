//! Listing source: where leaderboard pages come from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use neuraltheft_shared::{HarvestError, Result, RunConfig};

/// Production leaderboard host.
pub const DEFAULT_LISTING_BASE: &str = "https://tracker.gg";

/// Leaderboard path below the listing host.
const LEADERBOARD_PATH: &str = "/valorant/leaderboards/ranked/all/default";

/// The leaderboard host serves an empty shell to non-browser agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";

/// Default timeout in seconds for a page fetch.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Something that can hand out listing pages by 1-based index.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the raw HTML of page `page`.
    async fn fetch_page(&self, page: u32) -> Result<String>;
}

/// Build the HTTP client used for listing fetches.
pub fn listing_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetches leaderboard pages for one region over HTTP.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: Client,
    base: Url,
    region: String,
}

impl HttpListingSource {
    /// Create a source for `region` against the production host.
    pub fn new(client: Client, region: impl Into<String>) -> Result<Self> {
        let base = Url::parse(DEFAULT_LISTING_BASE)
            .map_err(|e| HarvestError::config(format!("bad listing base URL: {e}")))?;
        Ok(Self {
            client,
            base,
            region: region.into(),
        })
    }

    /// Create a source for the region named in `config`.
    pub fn from_config(client: Client, config: &RunConfig) -> Result<Self> {
        Self::new(client, config.region.clone())
    }

    /// Point the source at another host (mock servers, mirrors).
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// Full URL of listing page `page`.
    pub fn page_url(&self, page: u32) -> Result<Url> {
        let mut url = self
            .base
            .join(LEADERBOARD_PATH)
            .map_err(|e| HarvestError::config(format!("bad listing URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("platform", "pc")
            .append_pair("region", &self.region)
            .append_pair("page", &page.to_string());
        Ok(url)
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        let url = self.page_url(page)?;
        debug!(%url, page, "fetching listing page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: body read failed: {e}")))
    }
}
