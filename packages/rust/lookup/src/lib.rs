//! Account identifier resolution.
//!
//! Every collected player is looked up by `name#tag` on the HenrikDev
//! Valorant API, which answers with the account's stable `puuid`. The lookup
//! is a single bearer-authenticated GET; anything other than a 200 with a
//! well-formed body counts as a failure for that one player.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use neuraltheft_shared::{CollectedRecord, HarvestError, Result, RunConfig};

/// Production lookup API host.
pub const DEFAULT_LOOKUP_BASE: &str = "https://api.henrikdev.xyz";

/// Default timeout in seconds for one lookup.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Longest error-body excerpt carried into a lookup error.
const MAX_ERROR_BODY: usize = 200;

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("neuraltheft/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Resolver seam
// ---------------------------------------------------------------------------

/// Resolves a collected player to its stable account identifier.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve(&self, record: &CollectedRecord) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountResponse {
    data: AccountData,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    puuid: String,
}

/// Decode a 200 body into the account identifier.
fn parse_account(body: &str) -> std::result::Result<String, String> {
    let parsed: AccountResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response body: {e}"))?;
    let puuid = parsed.data.puuid.trim();
    if puuid.is_empty() {
        return Err("response carried an empty puuid".into());
    }
    Ok(puuid.to_string())
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ---------------------------------------------------------------------------
// HTTP resolver
// ---------------------------------------------------------------------------

/// Build the HTTP client used for lookups.
pub fn lookup_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))
}

/// Looks identifiers up over HTTP with a bearer credential.
pub struct HttpIdentifierResolver {
    client: Client,
    base: Url,
    credential: String,
}

impl HttpIdentifierResolver {
    /// Create a resolver against the production API.
    pub fn new(client: Client, credential: impl Into<String>) -> Result<Self> {
        let base = Url::parse(DEFAULT_LOOKUP_BASE)
            .map_err(|e| HarvestError::config(format!("bad lookup base URL: {e}")))?;
        Ok(Self {
            client,
            base,
            credential: credential.into(),
        })
    }

    /// Create a resolver using the credential in `config`.
    pub fn from_config(client: Client, config: &RunConfig) -> Result<Self> {
        Self::new(client, config.credential.clone())
    }

    /// Point the resolver at another host (mock servers, proxies).
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// Lookup URL for one player; name and tag are percent-encoded as path segments.
    pub fn account_url(&self, name: &str, tag: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| HarvestError::config(format!("lookup base {} cannot hold a path", self.base)))?
            .pop_if_empty()
            .extend(["valorant", "v1", "account", name, tag]);
        Ok(url)
    }
}

#[async_trait]
impl IdentifierResolver for HttpIdentifierResolver {
    #[instrument(skip_all, fields(player = %record))]
    async fn resolve(&self, record: &CollectedRecord) -> Result<String> {
        let player = record.to_string();
        let url = self.account_url(&record.display_name, &record.discriminator_tag)?;
        debug!(%url, "looking up account");

        let response = self
            .client
            .get(url.as_str())
            .bearer_auth(&self.credential)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| HarvestError::lookup(&player, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HarvestError::lookup(&player, format!("body read failed: {e}")))?;

        if status != StatusCode::OK {
            return Err(HarvestError::lookup(
                &player,
                format!("unexpected status {status}: {}", excerpt(&body)),
            ));
        }

        parse_account(&body).map_err(|reason| HarvestError::lookup(&player, reason))
    }
}
