//! Application and run configuration for neuraltheft.
//!
//! User config lives at `~/.neuraltheft/neuraltheft.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "neuraltheft.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".neuraltheft";

/// Slowest accepted lookup rate: one lookup every 100 minutes.
pub const MIN_RATE_PER_MINUTE: f64 = 0.01;

/// Fastest accepted lookup rate: one lookup per millisecond.
pub const MAX_RATE_PER_MINUTE: f64 = 60_000.0;

// ---------------------------------------------------------------------------
// Config structs (matching neuraltheft.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Defaults for `neuraltheft run`.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Where to find the lookup API credential.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Leaderboard region code.
    #[serde(default = "default_region")]
    pub region: String,

    /// Output database path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Identifier lookups per minute.
    #[serde(default = "default_rate_per_minute")]
    pub rate_per_minute: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            output: default_output(),
            rate_per_minute: default_rate_per_minute(),
        }
    }
}

fn default_region() -> String {
    "na".into()
}
fn default_output() -> String {
    "data.db".into()
}
fn default_rate_per_minute() -> f64 {
    75.0
}

/// `[credentials]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_key_env() -> String {
    "API_KEY".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Log verbosity carried through the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count onto a level.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// `EnvFilter` directive for the neuraltheft crates at this level.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Info => "neuraltheft=info",
            Self::Debug => "neuraltheft=debug",
            Self::Trace => "neuraltheft=trace",
        }
    }

    pub fn is_verbose(&self) -> bool {
        !matches!(self, Self::Info)
    }
}

/// Immutable configuration for one harvest run.
#[derive(Clone)]
pub struct RunConfig {
    /// Leaderboard region code (e.g. `na`, `eu`, `ap`).
    pub region: String,
    /// Path of the output database.
    pub output_path: PathBuf,
    /// Target identifier lookups per minute.
    pub rate_per_minute: f64,
    /// Bearer credential for the lookup API.
    pub credential: String,
    /// Log verbosity.
    pub log_level: LogLevel,
}

impl RunConfig {
    /// Build a run config from the file defaults and a resolved credential.
    pub fn from_app_config(config: &AppConfig, credential: String) -> Self {
        Self {
            region: config.defaults.region.clone(),
            output_path: PathBuf::from(&config.defaults.output),
            rate_per_minute: config.defaults.rate_per_minute,
            credential,
            log_level: LogLevel::default(),
        }
    }

    /// Reject parameters no run can proceed with.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(HarvestError::validation("region must not be empty"));
        }
        if !(MIN_RATE_PER_MINUTE..=MAX_RATE_PER_MINUTE).contains(&self.rate_per_minute) {
            return Err(HarvestError::validation(format!(
                "rate_per_minute must be between {MIN_RATE_PER_MINUTE} and {MAX_RATE_PER_MINUTE}, got {}",
                self.rate_per_minute
            )));
        }
        if self.credential.trim().is_empty() {
            return Err(HarvestError::config("lookup API credential is empty"));
        }
        Ok(())
    }

    /// Minimum spacing between two lookups.
    pub fn rate_period(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(60.0 / self.rate_per_minute)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or_else(|| {
                HarvestError::validation(format!(
                    "no lookup period for rate_per_minute {}",
                    self.rate_per_minute
                ))
            })
    }

    /// Capacity of the collector's output queue: about one rate-period of records.
    pub fn lookahead_capacity(&self) -> usize {
        (self.rate_per_minute.min(MAX_RATE_PER_MINUTE).floor() as usize).max(1)
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("region", &self.region)
            .field("output_path", &self.output_path)
            .field("rate_per_minute", &self.rate_per_minute)
            .field("credential", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.neuraltheft/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.neuraltheft/neuraltheft.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Load `KEY=value` pairs from the `.env` file in the working directory (or
/// an ancestor) into the process environment. Variables that are already set
/// keep their value. Returns the file that was read, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(HarvestError::config(format!("failed to load .env: {e}"))),
    }
}

/// Like [`load_dotenv`] for an explicit file. A missing file yields `Ok(false)`.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(HarvestError::config(format!(
            "failed to load {}: {e}",
            path.display()
        ))),
    }
}

/// Pick the lookup credential: an explicit value wins, otherwise the env var
/// named in `[credentials]`.
pub fn resolve_credential(explicit: Option<&str>, config: &AppConfig) -> Result<String> {
    if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
        return Ok(token.to_string());
    }

    let var_name = &config.credentials.api_key_env;
    tracing::debug!(var = %var_name, "no token given, reading environment");
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(HarvestError::config(format!(
            "lookup API key not found. Pass --token or set the {var_name} environment variable."
        ))),
    }
}
