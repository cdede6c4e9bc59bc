//! Core library for the `meteo` weather lookup tool.
//!
//! This crate defines:
//! - Configuration handling
//! - The Open-Meteo forecast/ensemble provider and place search
//! - Normalization of columnar weather blocks into time series
//! - Device location tracking and reverse geocoding
//! - The per-screen state controller consumed by front ends
//!
//! It is used by `meteo-cli`, but can also be reused by other front ends.

pub mod config;
pub mod error;
pub mod forecast;
pub mod geocoding;
pub mod location;
pub mod model;
pub mod provider;
pub mod reverse;
pub mod screen;
pub mod timeseries;
pub mod variable;
pub mod weather_code;

pub use config::Config;
pub use error::{FetchError, LocationError, NormalizeError};
pub use forecast::{WeatherClient, ensemble_request, forecast_request};
pub use geocoding::GeocodingClient;
pub use location::{LocationSource, LocationTracker, Subscription};
pub use model::{AddressParts, Coordinates, PlaceCandidate, SnapshotLocation, WeatherSnapshot};
pub use provider::{EnsembleRequest, ForecastProvider, ForecastRequest};
pub use reverse::{ReverseGeocoder, format_address};
pub use screen::{ScreenDeps, ScreenState, WeatherScreen};
pub use timeseries::{RawColumnarBlock, RawVariable, TimeSeries, normalize};
pub use variable::{Aggregation, VariableSelector};
pub use weather_code::{describe_code, describe_value};
