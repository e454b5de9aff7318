//! Geocoded locations and the batch geocoding step.
//!
//! A [`Location`] is built from one Nominatim search result. Only the top
//! match per query is kept; a query without a match yields `None` and is
//! reported back to the caller rather than aborting the batch.

use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::providers::Geocoder;
use crate::Coordinate;

/// Provenance and address metadata from the geocoding source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationDetails {
    pub display_name: Option<String>,
    pub osm_id: Option<i64>,
    pub osm_type: Option<String>,
    pub place_id: Option<i64>,
    pub licence: Option<String>,
    pub amenity: Option<String>,
    pub road: Option<String>,
    pub house_number: Option<String>,
    pub quarter: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub iso3166_2_lvl4: Option<String>,
    pub place_rank: Option<i64>,
    pub importance: Option<f64>,
    pub addresstype: Option<String>,
    /// Comma separated `south,north,west,east`
    pub boundingbox: Option<String>,
}

/// A geocoded point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Store-assigned identifier, `None` until persisted
    pub id: Option<i64>,
    pub name: String,
    /// Absent when the source returned no usable coordinate
    pub coordinate: Option<Coordinate>,
    pub details: LocationDetails,
}

impl Location {
    /// Create a location with a coordinate and no metadata.
    pub fn new(name: &str, coordinate: Coordinate) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            coordinate: Some(coordinate),
            details: LocationDetails::default(),
        }
    }

    /// A location without coordinates is not routable.
    pub fn is_routable(&self) -> bool {
        self.coordinate.is_some_and(|c| c.is_valid())
    }

    /// Human readable label: `name (road, house_number, city, postcode, country)`.
    pub fn label(&self) -> String {
        let d = &self.details;
        let parts: Vec<&str> = [&d.road, &d.house_number, &d.city, &d.postcode, &d.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        format!("{} ({})", self.name, parts.join(", "))
    }
}

// =============================================================================
// Nominatim payload
// =============================================================================

/// Address block of a Nominatim result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    pub amenity: Option<String>,
    pub road: Option<String>,
    pub house_number: Option<String>,
    pub quarter: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    pub iso3166_2_lvl4: Option<String>,
}

/// One result of a Nominatim `/search?format=json&addressdetails=1` query.
///
/// Numeric fields are accepted both as JSON numbers and as strings; empty
/// strings count as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimPlace {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub lon: Option<f64>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub place_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub osm_id: Option<i64>,
    #[serde(default)]
    pub osm_type: Option<String>,
    #[serde(default)]
    pub licence: Option<String>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub place_rank: Option<i64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub importance: Option<f64>,
    #[serde(default)]
    pub addresstype: Option<String>,
    #[serde(default)]
    pub boundingbox: Option<Vec<String>>,
    #[serde(default)]
    pub address: Option<NominatimAddress>,
}

fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn flexible_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl From<NominatimPlace> for Location {
    fn from(place: NominatimPlace) -> Self {
        let coordinate = match (place.lat, place.lon) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        };
        let address = place.address.unwrap_or_default();

        Location {
            id: None,
            name: place.name.unwrap_or_default(),
            coordinate,
            details: LocationDetails {
                display_name: place.display_name,
                osm_id: place.osm_id,
                osm_type: place.osm_type,
                place_id: place.place_id,
                licence: place.licence,
                amenity: address.amenity,
                road: address.road,
                house_number: address.house_number,
                quarter: address.quarter,
                suburb: address.suburb,
                city: address.city,
                state: address.state,
                postcode: address.postcode,
                country: address.country,
                iso3166_2_lvl4: address.iso3166_2_lvl4,
                place_rank: place.place_rank,
                importance: place.importance,
                addresstype: place.addresstype,
                boundingbox: place
                    .boundingbox
                    .filter(|b| !b.is_empty())
                    .map(|b| b.join(",")),
            },
        }
    }
}

// =============================================================================
// Batch geocoding
// =============================================================================

/// Geocode every query and keep its top match.
///
/// Returns one entry per query, in input order. Service failures abort the
/// batch; queries without a match produce `None`.
pub fn geocode_batch<G>(
    geocoder: &G,
    queries: &[String],
    progress: &mut dyn ProgressSink,
) -> Result<Vec<Option<Location>>>
where
    G: Geocoder + ?Sized,
{
    let total = queries.len();
    let mut results = Vec::with_capacity(total);

    for (i, query) in queries.iter().enumerate() {
        progress.report(&ProgressEvent::new(Stage::Geocoding, i + 1, total, query.as_str()));
        let location = geocoder.top_match(query)?;
        if location.is_none() {
            debug!("[Geocoding] No match for '{}'", query);
        }
        results.push(location);
    }

    let found = results.iter().filter(|l| l.is_some()).count();
    info!("[Geocoding] Resolved {}/{} addresses", found, total);

    Ok(results)
}
