use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};

use crate::location::{LocationSource, WatchOptions};
use crate::model::Coordinates;

/// Where the device position comes from, and what to use when it can't be had.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// "ip", "fixed" or "off".
    pub source: String,
    /// Position reported by the "fixed" source.
    pub fixed: Option<Coordinates>,
    /// Used when no position can be acquired.
    pub fallback: Coordinates,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: LocationSource::Ip.as_str().to_string(),
            fixed: None,
            fallback: Coordinates::new(48.8397, 2.2421),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub count: u32,
    pub language: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { count: 10, language: "en".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub current: Vec<String>,
    pub hourly: Vec<String>,
    pub daily: Vec<String>,
    /// Passed through to the API; "auto" resolves the timezone of the coordinates.
    pub timezone: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            current: strings(&["temperature_2m", "weather_code", "wind_speed_10m"]),
            hourly: strings(&["temperature_2m", "weather_code", "wind_speed_10m"]),
            daily: strings(&["temperature_2m_max", "temperature_2m_min", "weather_code", "wind_speed_10m_max"]),
            timezone: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub models: String,
    pub hourly: Vec<String>,
    pub daily: Vec<String>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            models: "icon_seamless".to_string(),
            hourly: strings(&[
                "temperature_2m",
                "weather_code",
                "precipitation",
                "rain",
                "snowfall",
                "cloud_cover",
                "wind_speed_10m",
            ]),
            daily: strings(&[
                "temperature_2m_min",
                "temperature_2m_mean",
                "temperature_2m_max",
                "precipitation_sum",
                "precipitation_hours",
                "snowfall_sum",
                "rain_sum",
                "wind_speed_10m_mean",
                "wind_speed_10m_min",
                "wind_speed_10m_max",
            ]),
        }
    }
}

/// Base URLs of every remote service. Overridable so tests can point at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub geocoding: String,
    pub forecast: String,
    pub ensemble: String,
    pub reverse_geocoding: String,
    pub ip_location: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocoding: "https://geocoding-api.open-meteo.com".to_string(),
            forecast: "https://api.open-meteo.com".to_string(),
            ensemble: "https://ensemble-api.open-meteo.com".to_string(),
            reverse_geocoding: "https://nominatim.openstreetmap.org".to_string(),
            ip_location: "http://ip-api.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("meteo/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Build the shared HTTP client.
    pub fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How often the position is read while watching.
    pub sample_interval_ms: u64,
    pub min_interval_secs: u64,
    pub min_distance_m: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            min_interval_secs: 5,
            min_distance_m: 10.0,
        }
    }
}

impl WatchConfig {
    pub fn options(&self) -> WatchOptions {
        WatchOptions {
            sample_every: Duration::from_millis(self.sample_interval_ms),
            min_interval: Duration::from_secs(self.min_interval_secs),
            min_distance_m: self.min_distance_m,
            ..WatchOptions::default()
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [location]
/// source = "fixed"
/// fixed = { latitude = 52.52, longitude = 13.41 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub search: SearchConfig,
    pub forecast: ForecastConfig,
    pub ensemble: EnsembleConfig,
    pub endpoints: Endpoints,
    pub http: HttpConfig,
    pub watch: WatchConfig,
}

impl Config {
    /// Return the location source as a strongly-typed LocationSource.
    pub fn location_source(&self) -> Result<LocationSource> {
        LocationSource::try_from(self.location.source.as_str())
    }

    pub fn set_location_source(&mut self, source: LocationSource) {
        self.location.source = source.as_str().to_string();
    }

    /// Use the "fixed" source at `coords`.
    pub fn pin_location(&mut self, coords: Coordinates) {
        self.set_location_source(LocationSource::Fixed);
        self.location.fixed = Some(coords);
    }

    /// Load config from the platform config dir, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config dir, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "meteo", "meteo-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
