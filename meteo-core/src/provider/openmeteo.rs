use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::FetchError;
use crate::timeseries::{RawColumnarBlock, RawVariable};
use crate::variable::VariableName;

use super::{EnsembleRequest, ForecastProvider, ForecastRequest, RawResponse, read_json};

const HOURLY_INTERVAL: i64 = 3600;
const DAILY_INTERVAL: i64 = 86_400;

/// Open-Meteo forecast and ensemble APIs, JSON flavour with unix timestamps.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    forecast_url: String,
    ensemble_url: String,
}

impl OpenMeteoProvider {
    pub fn new(http: Client, forecast_url: impl Into<String>, ensemble_url: impl Into<String>) -> Self {
        Self {
            http,
            forecast_url: forecast_url.into(),
            ensemble_url: ensemble_url.into(),
        }
    }

    async fn fetch(
        &self,
        url: String,
        params: Vec<(&'static str, String)>,
        service: &'static str,
        ensemble: bool,
    ) -> Result<RawResponse, FetchError> {
        tracing::debug!(%url, ?params, "{service} request");

        let res = self.http.get(&url).query(&params).send().await?;
        let parsed: OmResponse = read_json(res, service).await?;

        Ok(parsed.into_raw(ensemble))
    }
}

fn base_params(coords: &crate::model::Coordinates) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", coords.latitude.to_string()),
        ("longitude", coords.longitude.to_string()),
        ("timeformat", "unixtime".to_string()),
    ]
}

fn push_list(params: &mut Vec<(&'static str, String)>, name: &'static str, values: &[String]) {
    if !values.is_empty() {
        params.push((name, values.join(",")));
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    async fn forecast(&self, request: &ForecastRequest) -> Result<RawResponse, FetchError> {
        let mut params = base_params(&request.coords);
        push_list(&mut params, "current", &request.current);
        push_list(&mut params, "hourly", &request.hourly);
        push_list(&mut params, "daily", &request.daily);
        if let Some(tz) = &request.timezone {
            params.push(("timezone", tz.clone()));
        }

        let url = format!("{}/v1/forecast", self.forecast_url.trim_end_matches('/'));
        self.fetch(url, params, "forecast", false).await
    }

    async fn ensemble(&self, request: &EnsembleRequest) -> Result<RawResponse, FetchError> {
        let mut params = base_params(&request.coords);
        params.push(("models", request.models.clone()));
        push_list(&mut params, "hourly", &request.hourly);
        push_list(&mut params, "daily", &request.daily);
        if let Some(tz) = &request.timezone {
            params.push(("timezone", tz.clone()));
        }

        let url = format!("{}/v1/ensemble", self.ensemble_url.trim_end_matches('/'));
        self.fetch(url, params, "ensemble", true).await
    }
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    #[serde(default)]
    utc_offset_seconds: i64,
    timezone: Option<String>,
    current: Option<OmInstant>,
    hourly: Option<OmSeries>,
    daily: Option<OmSeries>,
}

#[derive(Debug, Deserialize)]
struct OmInstant {
    time: i64,
    interval: i64,
    #[serde(flatten)]
    columns: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OmSeries {
    time: Vec<i64>,
    #[serde(flatten)]
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl OmResponse {
    fn into_raw(self, ensemble: bool) -> RawResponse {
        let offset = self.utc_offset_seconds;

        RawResponse {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation: self.elevation,
            utc_offset_seconds: offset,
            timezone: self.timezone,
            current: self.current.map(|c| c.into_block(offset, ensemble)),
            hourly: self.hourly.map(|h| h.into_block(HOURLY_INTERVAL, offset, ensemble)),
            daily: self.daily.map(|d| d.into_block(DAILY_INTERVAL, offset, ensemble)),
        }
    }
}

impl OmInstant {
    fn into_block(self, offset: i64, ensemble: bool) -> RawColumnarBlock {
        let variables = self
            .columns
            .into_iter()
            .map(|(key, value)| raw_variable(&key, vec![value.unwrap_or(f64::NAN)], ensemble))
            .collect();

        RawColumnarBlock {
            time: self.time,
            time_end: self.time + self.interval,
            interval: self.interval,
            utc_offset_seconds: offset,
            variables,
        }
    }
}

impl OmSeries {
    fn into_block(self, default_interval: i64, offset: i64, ensemble: bool) -> RawColumnarBlock {
        let start = self.time.first().copied().unwrap_or(0);
        let interval = match self.time.as_slice() {
            [first, second, ..] => second - first,
            _ => default_interval,
        };

        if self.time.windows(2).any(|w| w[1] - w[0] != interval) {
            // Daylight-saving transitions make local daily steps 23h or 25h.
            tracing::debug!(interval, "irregular time steps; using the first step as interval");
        }

        let variables = self
            .columns
            .into_iter()
            .map(|(key, values)| {
                let values = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                raw_variable(&key, values, ensemble)
            })
            .collect();

        RawColumnarBlock {
            time: start,
            time_end: start + self.time.len() as i64 * interval,
            interval,
            utc_offset_seconds: offset,
            variables,
        }
    }
}

/// In ensemble responses the unsuffixed column is the control run, member 0.
fn raw_variable(key: &str, values: Vec<f64>, ensemble: bool) -> RawVariable {
    let name = VariableName::parse(key);
    let ensemble_member = match (name.ensemble_member, ensemble) {
        (Some(member), _) => Some(member),
        (None, true) => Some(0),
        (None, false) => None,
    };

    RawVariable {
        variable: name.variable,
        altitude: name.altitude,
        aggregation: name.aggregation,
        ensemble_member,
        values,
    }
}
