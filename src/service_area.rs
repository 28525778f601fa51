// Service-area validation
//
// Mobile service only travels so far: addresses are geocoded and checked
// against a radius around the home base. Geocoder outages do not block
// bookings; the check degrades to accepted-with-warning so a third-party
// hiccup never turns customers away.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Home base coordinates (North Hollywood)
pub const BASE_LATITUDE: f64 = 34.1714;
pub const BASE_LONGITUDE: f64 = -118.4287;
pub const BASE_ZIP: &str = "91602";

/// Maximum travel distance from base, in miles
pub const SERVICE_RADIUS_MILES: f64 = 15.0;

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Outcome of checking an address against the service area
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceAreaCheck {
    /// Address geocoded inside the radius
    Inside { distance_miles: f64 },
    /// Address geocoded outside the radius
    Outside { distance_miles: f64 },
    /// Address could not be resolved; booking proceeds with a warning
    Unverified { message: String },
}

/// Great-circle distance between two coordinates, in miles
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_MILES * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Translates street addresses to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address to (latitude, longitude), or None when the
    /// provider cannot place it
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>, String>;
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim-backed geocoder (OpenStreetMap)
pub struct NominatimGeocoder {
    http: Client,
    api_base: String,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        let http = Client::builder()
            .user_agent("detailing-api/1.0")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base: "https://nominatim.openstreetmap.org".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>, String> {
        let url = format!("{}/search", self.api_base);
        let places: Vec<NominatimPlace> = self
            .http
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let Some(place) = places.first() else {
            return Ok(None);
        };

        let lat: f64 = place.lat.parse().map_err(|_| "bad latitude".to_string())?;
        let lon: f64 = place.lon.parse().map_err(|_| "bad longitude".to_string())?;
        Ok(Some((lat, lon)))
    }
}

/// Checks booking addresses against the service radius
pub struct ServiceArea {
    geocoder: Box<dyn Geocoder>,
}

impl ServiceArea {
    pub fn new(geocoder: Box<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    pub async fn check(&self, address: &str, city: &str, zip_code: &str) -> ServiceAreaCheck {
        // The base ZIP never needs a network round trip.
        if zip_code.starts_with(BASE_ZIP) {
            return ServiceAreaCheck::Inside { distance_miles: 0.0 };
        }

        let full_address = format!("{address}, {city}, {zip_code}");
        match self.geocoder.geocode(&full_address).await {
            Ok(Some((lat, lon))) => {
                let distance_miles =
                    haversine_miles(BASE_LATITUDE, BASE_LONGITUDE, lat, lon);
                debug!(address = %full_address, distance_miles, "address geocoded");
                if distance_miles <= SERVICE_RADIUS_MILES {
                    ServiceAreaCheck::Inside { distance_miles }
                } else {
                    ServiceAreaCheck::Outside { distance_miles }
                }
            }
            Ok(None) => {
                debug!(address = %full_address, "geocoder found no match");
                ServiceAreaCheck::Unverified {
                    message: "We could not verify your address is within our service area; \
                              we will confirm by phone."
                        .to_string(),
                }
            }
            Err(e) => {
                warn!(address = %full_address, error = %e, "geocoder unavailable");
                ServiceAreaCheck::Unverified {
                    message: "Address verification is temporarily unavailable; \
                              we will confirm your location by phone."
                        .to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        let d = haversine_miles(BASE_LATITUDE, BASE_LONGITUDE, BASE_LATITUDE, BASE_LONGITUDE);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Base to downtown Los Angeles is roughly 11 miles.
        let d = haversine_miles(BASE_LATITUDE, BASE_LONGITUDE, 34.0522, -118.2437);
        assert!((10.0..13.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_haversine_out_of_radius() {
        // Base to Santa Clarita, well past the radius.
        let d = haversine_miles(BASE_LATITUDE, BASE_LONGITUDE, 34.3917, -118.5426);
        assert!(d > SERVICE_RADIUS_MILES, "got {d}");
    }

    struct FixedGeocoder(Option<(f64, f64)>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _address: &str) -> Result<Option<(f64, f64)>, String> {
            Ok(self.0)
        }
    }

    struct DownGeocoder;

    #[async_trait]
    impl Geocoder for DownGeocoder {
        async fn geocode(&self, _address: &str) -> Result<Option<(f64, f64)>, String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn test_base_zip_skips_geocoding() {
        let area = ServiceArea::new(Box::new(DownGeocoder));
        let check = area.check("123 Main St", "North Hollywood", "91602").await;
        assert_eq!(check, ServiceAreaCheck::Inside { distance_miles: 0.0 });
    }

    #[tokio::test]
    async fn test_nearby_address_inside() {
        let area = ServiceArea::new(Box::new(FixedGeocoder(Some((34.15, -118.40)))));
        match area.check("456 Oak Ave", "Studio City", "91604").await {
            ServiceAreaCheck::Inside { distance_miles } => {
                assert!(distance_miles < SERVICE_RADIUS_MILES)
            }
            other => panic!("expected Inside, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_distant_address_outside() {
        let area = ServiceArea::new(Box::new(FixedGeocoder(Some((33.68, -117.83)))));
        match area.check("789 Far Rd", "Irvine", "92602").await {
            ServiceAreaCheck::Outside { distance_miles } => {
                assert!(distance_miles > SERVICE_RADIUS_MILES)
            }
            other => panic!("expected Outside, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_geocoder_outage_is_unverified() {
        let area = ServiceArea::new(Box::new(DownGeocoder));
        match area.check("1 Somewhere Ln", "Burbank", "91501").await {
            ServiceAreaCheck::Unverified { .. } => {}
            other => panic!("expected Unverified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_unverified() {
        let area = ServiceArea::new(Box::new(FixedGeocoder(None)));
        match area.check("asdf", "qwer", "00000").await {
            ServiceAreaCheck::Unverified { .. } => {}
            other => panic!("expected Unverified, got {other:?}"),
        }
    }
}
