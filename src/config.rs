use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::AggregationStrategy;
use crate::classify::ThresholdTable;

const DEFAULT_CONFIG_PATH: &str = "/config/envmon.yaml";

/// Stable identifier for a monitored location.
///
/// Ids key every lookup table in the pipeline; display names are carried
/// separately and never used as keys. Validated at construction so a typo in
/// config fails loudly instead of producing a silently empty location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId(String);

impl LocationId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            bail!("location id must not be empty");
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!("location id `{raw}` must be lowercase alphanumeric with dashes");
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LocationId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        LocationId::new(value).map_err(|err| err.to_string())
    }
}

impl From<LocationId> for String {
    fn from(id: LocationId) -> String {
        id.0
    }
}

/// One monitored location: stable id plus display-only name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub id: LocationId,
    pub name: String,
}

/// Top-level configuration for the envmon service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_locations")]
    pub locations: Vec<LocationConfig>,
    #[serde(default)]
    pub sample_intervals: SampleIntervals,
    #[serde(default)]
    pub thresholds: ThresholdTable,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl AppConfig {
    fn default_locations() -> Vec<LocationConfig> {
        [
            ("living-room", "Living Room"),
            ("kitchen", "Kitchen"),
            ("bedroom", "Bedroom"),
            ("garage", "Garage"),
        ]
        .into_iter()
        .map(|(id, name)| LocationConfig {
            id: LocationId(id.to_string()),
            name: name.to_string(),
        })
        .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            locations: Self::default_locations(),
            sample_intervals: SampleIntervals::default(),
            thresholds: ThresholdTable::default(),
            aggregation: AggregationConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Refresh cadence for the two cycles (with friendly duration parsing).
#[derive(Debug, Clone, Deserialize)]
pub struct SampleIntervals {
    /// Fast cycle: current readings for every location.
    #[serde(default = "SampleIntervals::default_current", with = "humantime_serde")]
    pub current: Duration,
    /// Slow cycle: historical re-aggregation.
    #[serde(default = "SampleIntervals::default_history", with = "humantime_serde")]
    pub history: Duration,
}

impl SampleIntervals {
    const fn default_current() -> Duration {
        Duration::from_secs(30)
    }

    const fn default_history() -> Duration {
        Duration::from_secs(300)
    }
}

impl Default for SampleIntervals {
    fn default() -> Self {
        Self {
            current: Self::default_current(),
            history: Self::default_history(),
        }
    }
}

/// Historical aggregation behavior.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AggregationConfig {
    #[serde(default)]
    pub strategy: AggregationStrategy,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
    #[serde(default = "HttpConfig::default_static_dir")]
    pub static_dir: String,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_static_dir() -> String {
        "frontend/dist".to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            static_dir: Self::default_static_dir(),
        }
    }
}

/// Load configuration from a YAML file, falling back to defaults + env
/// overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var("ENVMON_CONFIG") {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let cfg = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse YAML config at {}", path.display()))?;
            Ok(Some(cfg))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(bind) = env::var("ENVMON_BIND") {
        if !bind.is_empty() {
            config.http.bind = bind;
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.locations.is_empty() {
        bail!("at least one location must be configured");
    }
    let mut seen = std::collections::HashSet::new();
    for location in &config.locations {
        if !seen.insert(&location.id) {
            bail!("duplicate location id `{}`", location.id);
        }
    }
    Ok(())
}
