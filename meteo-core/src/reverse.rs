//! Human-readable names for coordinates.

use std::sync::Arc;

use crate::location::LocationPlatform;
use crate::model::{AddressParts, Coordinates};

/// "12, Rue de Paris, Boulogne-Billancourt, Île-de-France, France", with
/// empty or absent parts left out.
pub fn format_address(parts: &AddressParts) -> String {
    [
        &parts.street_number,
        &parts.street,
        &parts.city,
        &parts.region,
        &parts.country,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref())
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

#[derive(Debug, Clone)]
pub struct ReverseGeocoder {
    platform: Arc<dyn LocationPlatform>,
}

impl ReverseGeocoder {
    pub fn new(platform: Arc<dyn LocationPlatform>) -> Self {
        Self { platform }
    }

    /// Address of the first candidate place, `None` when there is none.
    pub async fn describe(&self, coords: Coordinates) -> Option<String> {
        let candidates = match self.platform.reverse_geocode(coords).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%coords, "reverse geocoding failed: {e}");
                return None;
            }
        };

        let address = format_address(candidates.first()?);
        tracing::debug!(%coords, %address, "reverse geocoded");
        Some(address)
    }
}
