//! Model configuration: modality rules and service endpoints.
//!
//! The routing section of the model configuration is read once per run and
//! treated as read-only input. A missing `routing` key is a fatal
//! precondition failure; unknown modality keys are tolerated here and
//! reported by the routing policy.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Environment variable naming the model configuration file.
pub const MODEL_CONFIG_ENV: &str = "MODEL_CONFIG_FILE";
const DEFAULT_MODEL_CONFIG: &str = "./model_config.json";

/// Default buffer around the location hull when fetching a road network.
pub const DEFAULT_BUFFER_METERS: f64 = 2000.0;

/// Transit modes requested from the planner when a rule names none.
pub const DEFAULT_TRANSPORT_MODES: [&str; 8] = [
    "BUS", "TRAM", "RAIL", "SUBWAY", "FERRY", "GONDOLA", "FUNICULAR", "WALK",
];

/// One modality rule from the `routing` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModalityRule {
    /// Modality key (`walk`, `bicycle`, `public_transport_walking`)
    pub modality: String,
    /// Label attached to routes and segments; falls back to `modality`
    #[serde(default)]
    pub modality_display_name: Option<String>,
    /// Minimum distance from the main location in meters
    #[serde(default)]
    pub min_radius: f64,
    /// Maximum distance from the main location in meters, `None` = unbounded
    #[serde(default, deserialize_with = "deserialize_max_radius")]
    pub max_radius: Option<f64>,
    /// Road network fetch buffer in meters (walk / bicycle)
    #[serde(default)]
    pub buffer_meters: Option<f64>,
    /// Transit modes passed to the planner (public transport)
    #[serde(default)]
    pub transport_modes: Option<Vec<String>>,
}

impl ModalityRule {
    /// Create a rule with default routing parameters.
    pub fn new(modality: &str, min_radius: f64, max_radius: Option<f64>) -> Self {
        Self {
            modality: modality.to_string(),
            modality_display_name: None,
            min_radius,
            max_radius,
            buffer_meters: None,
            transport_modes: None,
        }
    }

    /// Set the display name used as route and segment label.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.modality_display_name = Some(name.to_string());
        self
    }

    /// Label attached to routes and segments produced under this rule.
    pub fn display_name(&self) -> &str {
        self.modality_display_name
            .as_deref()
            .unwrap_or(&self.modality)
    }

    /// True if a candidate at `distance` meters falls inside this rule's ring.
    pub fn includes(&self, distance: f64) -> bool {
        self.min_radius <= distance && self.max_radius.map_or(true, |max| distance <= max)
    }

    pub fn buffer_meters(&self) -> f64 {
        self.buffer_meters.unwrap_or(DEFAULT_BUFFER_METERS)
    }

    pub fn transport_modes(&self) -> Vec<String> {
        match &self.transport_modes {
            Some(modes) => modes.clone(),
            None => DEFAULT_TRANSPORT_MODES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

// -1 is the "unbounded" sentinel in existing configuration files
fn deserialize_max_radius<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        Some(v) if v == -1.0 => Ok(None),
        Some(v) if v < 0.0 => Err(serde::de::Error::custom(format!(
            "max_radius must be -1 or non-negative, got {}",
            v
        ))),
        value => Ok(value),
    }
}

fn default_min_frequency() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawModelConfig {
    routing: Option<Vec<ModalityRule>>,
    #[serde(default = "default_min_frequency")]
    min_segment_frequency: u32,
}

/// Ordered modality rules plus the global segment frequency threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingModalityConfig {
    pub rules: Vec<ModalityRule>,
    pub min_segment_frequency: u32,
}

impl RoutingModalityConfig {
    /// Build a configuration from rules. Fails if `rules` is empty.
    pub fn new(rules: Vec<ModalityRule>, min_segment_frequency: u32) -> Result<Self> {
        if rules.is_empty() {
            return Err(Error::MissingRouting);
        }
        Ok(Self { rules, min_segment_frequency })
    }

    /// Parse the model configuration JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawModelConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse model config: {}", e)))?;
        let rules = raw.routing.ok_or(Error::MissingRouting)?;
        Self::new(rules, raw.min_segment_frequency)
    }

    /// Read and parse a model configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("[Config] Loading model config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load the file named by `MODEL_CONFIG_FILE` (default `./model_config.json`).
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(MODEL_CONFIG_ENV).unwrap_or_else(|_| DEFAULT_MODEL_CONFIG.to_string());
        Self::from_path(path)
    }
}

/// Base URLs and storage location of the external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEndpoints {
    pub nominatim_url: String,
    pub otp_url: String,
    pub database_url: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            nominatim_url: "http://localhost:8080".to_string(),
            otp_url: "http://localhost:9080/otp/gtfs/v1".to_string(),
            database_url: "sqlite:///data/schulwege/schulwege.db".to_string(),
        }
    }
}

impl ServiceEndpoints {
    /// Read `NOMINATIM_HOST_PORT`, `OTP_HOST_PORT` and `SQL_DATABASE_URL`.
    pub fn from_env() -> Self {
        let mut endpoints = Self::default();
        if let Ok(port) = std::env::var("NOMINATIM_HOST_PORT") {
            endpoints.nominatim_url = format!("http://localhost:{}", port);
        }
        if let Ok(port) = std::env::var("OTP_HOST_PORT") {
            endpoints.otp_url = format!("http://localhost:{}/otp/gtfs/v1", port);
        }
        if let Ok(url) = std::env::var("SQL_DATABASE_URL") {
            endpoints.database_url = url;
        }
        endpoints
    }

    /// File path of the SQLite database, if the database URL is a SQLite URL.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.database_url
            .strip_prefix("sqlite:///")
            .map(PathBuf::from)
    }
}
