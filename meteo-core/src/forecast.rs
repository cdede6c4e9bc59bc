use std::sync::Arc;

use crate::config::Config;
use crate::error::FetchError;
use crate::model::{Coordinates, SnapshotLocation, WeatherSnapshot};
use crate::provider::{EnsembleRequest, ForecastProvider, ForecastRequest, RawResponse};
use crate::timeseries::{RawColumnarBlock, TimeSeries, normalize};
use crate::variable::VariableSelector;

/// Fetches forecasts and reshapes them into [`WeatherSnapshot`]s.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    provider: Arc<dyn ForecastProvider>,
}

impl WeatherClient {
    pub fn new(provider: Arc<dyn ForecastProvider>) -> Self {
        Self { provider }
    }

    pub async fn snapshot(&self, request: &ForecastRequest) -> Result<WeatherSnapshot, FetchError> {
        let raw = self.provider.forecast(request).await?;
        let snapshot = build_snapshot(raw, &request.current, &request.hourly, &request.daily)?;

        tracing::info!(
            coords = %snapshot.location.coordinates(),
            hourly = snapshot.hourly.len(),
            daily = snapshot.daily.len(),
            "forecast fetched"
        );
        Ok(snapshot)
    }

    /// Ensemble forecast; every member of every variable gets its own key.
    pub async fn ensemble(&self, request: &EnsembleRequest) -> Result<WeatherSnapshot, FetchError> {
        let raw = self.provider.ensemble(request).await?;
        let snapshot = build_snapshot(raw, &[], &request.hourly, &request.daily)?;

        tracing::info!(
            models = %request.models,
            hourly_keys = snapshot.hourly.variables.len(),
            daily_keys = snapshot.daily.variables.len(),
            "ensemble fetched"
        );
        Ok(snapshot)
    }
}

fn build_snapshot(
    raw: RawResponse,
    current: &[String],
    hourly: &[String],
    daily: &[String],
) -> Result<WeatherSnapshot, FetchError> {
    Ok(WeatherSnapshot {
        location: SnapshotLocation {
            latitude: raw.latitude,
            longitude: raw.longitude,
            elevation: raw.elevation,
            utc_offset_seconds: raw.utc_offset_seconds,
            timezone: raw.timezone,
        },
        current: tier(raw.current.as_ref(), current)?,
        hourly: tier(raw.hourly.as_ref(), hourly)?,
        daily: tier(raw.daily.as_ref(), daily)?,
    })
}

fn tier(block: Option<&RawColumnarBlock>, names: &[String]) -> Result<TimeSeries, FetchError> {
    match block {
        Some(block) => Ok(normalize(block, &VariableSelector::from_api_names(names))?),
        None => Ok(TimeSeries::default()),
    }
}

/// Forecast request for `coords` using the configured variable lists.
pub fn forecast_request(config: &Config, coords: Coordinates) -> ForecastRequest {
    ForecastRequest {
        coords,
        current: config.forecast.current.clone(),
        hourly: config.forecast.hourly.clone(),
        daily: config.forecast.daily.clone(),
        timezone: Some(config.forecast.timezone.clone()),
    }
}

/// Ensemble request for `coords`; `models` overrides the configured model.
pub fn ensemble_request(config: &Config, coords: Coordinates, models: Option<&str>) -> EnsembleRequest {
    EnsembleRequest {
        coords,
        models: models.unwrap_or(&config.ensemble.models).to_string(),
        hourly: config.ensemble.hourly.clone(),
        daily: config.ensemble.daily.clone(),
        timezone: Some(config.forecast.timezone.clone()),
    }
}
