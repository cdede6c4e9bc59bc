use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::error::FetchError;
use crate::model::Coordinates;
use crate::timeseries::RawColumnarBlock;

pub mod openmeteo;

pub use openmeteo::OpenMeteoProvider;

/// Parameters of a single-model forecast fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub coords: Coordinates,
    pub current: Vec<String>,
    pub hourly: Vec<String>,
    pub daily: Vec<String>,
    pub timezone: Option<String>,
}

impl ForecastRequest {
    pub fn new(coords: Coordinates) -> Self {
        Self {
            coords,
            current: vec![],
            hourly: vec![],
            daily: vec![],
            timezone: None,
        }
    }
}

/// Parameters of an ensemble forecast fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleRequest {
    pub coords: Coordinates,
    pub models: String,
    pub hourly: Vec<String>,
    pub daily: Vec<String>,
    pub timezone: Option<String>,
}

/// Provider response before normalization: location metadata plus one
/// columnar block per tier that was returned.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub utc_offset_seconds: i64,
    pub timezone: Option<String>,
    pub current: Option<RawColumnarBlock>,
    pub hourly: Option<RawColumnarBlock>,
    pub daily: Option<RawColumnarBlock>,
}

#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn forecast(&self, request: &ForecastRequest) -> Result<RawResponse, FetchError>;

    async fn ensemble(&self, request: &EnsembleRequest) -> Result<RawResponse, FetchError>;
}

/// Check the status and decode a JSON body, keeping a snippet of the body on failure.
pub(crate) async fn read_json<T: DeserializeOwned>(
    res: reqwest::Response,
    service: &'static str,
) -> Result<T, FetchError> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        return Err(FetchError::Status {
            service,
            status,
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        service,
        message: e.to_string(),
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
