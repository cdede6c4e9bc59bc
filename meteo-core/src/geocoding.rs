//! Place search via the Open-Meteo geocoding API.

use reqwest::Client;
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::PlaceCandidate;
use crate::provider::read_json;

#[derive(Debug, Clone)]
pub struct GeocodingClient {
    http: Client,
    base_url: String,
    count: u32,
    language: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<PlaceCandidate>>,
}

impl GeocodingClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            count: 10,
            language: "en".to_string(),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Ranked candidates for `query`, in provider order. The query is sent as
    /// typed; a blank one returns nothing without touching the network.
    pub async fn search(&self, query: &str) -> Result<Vec<PlaceCandidate>, FetchError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/v1/search", self.base_url.trim_end_matches('/'));
        let count = self.count.to_string();
        tracing::debug!(%url, query, "geocoding search");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("name", query),
                ("count", count.as_str()),
                ("language", self.language.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        let body: SearchResponse = read_json(res, "geocoding").await?;
        Ok(body.results.unwrap_or_default())
    }
}
