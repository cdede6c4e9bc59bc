//! Location services for a desktop host.
//!
//! Positions come from IP geolocation (ip-api.com) or from configuration;
//! reverse geocoding uses Nominatim (OpenStreetMap), no API key required.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Accuracy, LocationPlatform, LocationSource, PermissionStatus};
use crate::error::{FetchError, LocationError};
use crate::model::{AddressParts, Coordinates};
use crate::provider::read_json;

#[derive(Debug, Clone)]
pub struct HostPlatform {
    source: LocationSource,
    fixed: Option<Coordinates>,
    http: Client,
    ip_location_url: String,
    reverse_geocoding_url: String,
    language: String,
}

impl HostPlatform {
    pub fn new(
        source: LocationSource,
        fixed: Option<Coordinates>,
        http: Client,
        ip_location_url: impl Into<String>,
        reverse_geocoding_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            fixed,
            http,
            ip_location_url: ip_location_url.into(),
            reverse_geocoding_url: reverse_geocoding_url.into(),
            language: "en".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn source(&self) -> LocationSource {
        self.source
    }

    async fn ip_position(&self) -> Result<Coordinates, LocationError> {
        let url = format!("{}/json", self.ip_location_url.trim_end_matches('/'));
        tracing::debug!(%url, "ip geolocation request");

        let res = self.http.get(&url).send().await.map_err(FetchError::from)?;
        let body: IpApiResponse = read_json(res, "ip geolocation").await?;

        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => {
                tracing::info!(
                    lat,
                    lon,
                    city = body.city.as_deref().unwrap_or("-"),
                    "ip geolocation resolved"
                );
                Ok(Coordinates::new(lat, lon))
            }
            _ => Err(LocationError::Other(format!(
                "ip geolocation failed: {}",
                body.message.unwrap_or(body.status)
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    house_number: Option<String>,
    road: Option<String>,
    pedestrian: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

impl From<NominatimAddress> for AddressParts {
    fn from(addr: NominatimAddress) -> Self {
        AddressParts {
            street_number: addr.house_number,
            street: addr.road.or(addr.pedestrian),
            // Prefer city > town > village > municipality
            city: addr.city.or(addr.town).or(addr.village).or(addr.municipality),
            region: addr.state.or(addr.county),
            country: addr.country,
        }
    }
}

#[async_trait]
impl LocationPlatform for HostPlatform {
    async fn request_permission(&self) -> PermissionStatus {
        match self.source {
            LocationSource::Off => PermissionStatus::Denied,
            LocationSource::Ip | LocationSource::Fixed => PermissionStatus::Granted,
        }
    }

    async fn services_enabled(&self) -> bool {
        match self.source {
            LocationSource::Fixed => self.fixed.is_some(),
            LocationSource::Ip => true,
            LocationSource::Off => false,
        }
    }

    async fn prompt_enable_services(&self) {
        tracing::warn!(
            "Location services are disabled. Pin a position with `meteo configure` \
             or pass --lat/--lon, or switch the location source to \"ip\"."
        );
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<Coordinates, LocationError> {
        match self.source {
            LocationSource::Fixed => self.fixed.ok_or(LocationError::Unavailable),
            LocationSource::Ip => self.ip_position().await,
            LocationSource::Off => Err(LocationError::Unavailable),
        }
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<Vec<AddressParts>, LocationError> {
        let url = format!("{}/reverse", self.reverse_geocoding_url.trim_end_matches('/'));
        let lat = coords.latitude.to_string();
        let lon = coords.longitude.to_string();

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("accept-language", self.language.as_str()),
            ])
            .send()
            .await
            .map_err(FetchError::from)?;

        let body: NominatimResponse = read_json(res, "reverse geocoding").await?;

        if let Some(error) = body.error {
            tracing::debug!(%error, "reverse geocoding found nothing");
            return Ok(vec![]);
        }

        Ok(body.address.map(AddressParts::from).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(source: LocationSource, fixed: Option<Coordinates>, server: &MockServer) -> HostPlatform {
        HostPlatform::new(source, fixed, Client::new(), server.uri(), server.uri())
    }

    #[tokio::test]
    async fn off_source_denies_permission() {
        let server = MockServer::start().await;
        let host = platform(LocationSource::Off, None, &server);

        assert_eq!(host.request_permission().await, PermissionStatus::Denied);
    }

    #[tokio::test]
    async fn fixed_source_without_coordinates_reports_services_disabled() {
        let server = MockServer::start().await;

        let host = platform(LocationSource::Fixed, None, &server);
        assert!(!host.services_enabled().await);

        let pinned = platform(LocationSource::Fixed, Some(Coordinates::new(1.0, 2.0)), &server);
        assert!(pinned.services_enabled().await);
        assert_eq!(pinned.current_position(Accuracy::High).await.unwrap(), Coordinates::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn ip_source_reads_position() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "lat": 48.8566,
                "lon": 2.3522,
                "city": "Paris"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let host = platform(LocationSource::Ip, None, &server);
        let coords = host.current_position(Accuracy::High).await.unwrap();
        assert_eq!(coords, Coordinates::new(48.8566, 2.3522));
    }

    #[tokio::test]
    async fn ip_source_failure_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "reserved range"
            })))
            .mount(&server)
            .await;

        let host = platform(LocationSource::Ip, None, &server);
        let err = host.current_position(Accuracy::High).await.unwrap_err();
        assert!(err.to_string().contains("reserved range"));
    }

    #[tokio::test]
    async fn reverse_geocode_maps_nominatim_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "48.8397"))
            .and(query_param("format", "jsonv2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "display_name": "12, Rue de Paris, Boulogne-Billancourt, ...",
                "address": {
                    "house_number": "12",
                    "road": "Rue de Paris",
                    "town": "Boulogne-Billancourt",
                    "state": "Île-de-France",
                    "country": "France"
                }
            })))
            .mount(&server)
            .await;

        let host = platform(LocationSource::Ip, None, &server);
        let parts = host.reverse_geocode(Coordinates::new(48.8397, 2.2421)).await.unwrap();

        assert_eq!(
            parts,
            vec![AddressParts {
                street_number: Some("12".into()),
                street: Some("Rue de Paris".into()),
                city: Some("Boulogne-Billancourt".into()),
                region: Some("Île-de-France".into()),
                country: Some("France".into()),
            }]
        );
    }

    #[tokio::test]
    async fn reverse_geocode_without_match_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "Unable to geocode" })),
            )
            .mount(&server)
            .await;

        let host = platform(LocationSource::Ip, None, &server);
        assert!(host.reverse_geocode(Coordinates::new(0.0, -160.0)).await.unwrap().is_empty());
    }
}
