//! # School Routes
//!
//! Plans and aggregates school routes: given a school location and a list of
//! student addresses, geocodes the addresses, computes walking, cycling and
//! public-transport walking routes to the school, and aggregates them into
//! frequency-weighted directed street segments ready for map rendering.
//!
//! This library provides:
//! - A modality routing policy driven by radius rules in the model configuration
//! - Segment aggregation with coordinate binning and a minimum-frequency filter
//! - Polyline merging and modality overlays for compact map layers
//! - Project storage and CSV/ZIP export
//!
//! ## Features
//!
//! - **`http`** - Nominatim geocoder and OpenTripPlanner transit adapters
//! - **`persistence`** - SQLite project store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use school_routes::{aggregate_segments, merge_polylines, Coordinate, Route};
//!
//! let route = Route::new(
//!     "walk",
//!     vec![Coordinate::new(52.0, 13.0), Coordinate::new(52.001, 13.001)],
//! );
//! let routes = vec![route.clone(), route.clone(), route];
//!
//! let segments = aggregate_segments(&routes, 1);
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].frequency, 3);
//!
//! let merged = merge_polylines(&segments);
//! assert_eq!(merged[0].points.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod geo_utils;

pub mod config;
pub use config::{ModalityRule, RoutingModalityConfig, ServiceEndpoints};

pub mod progress;
pub use progress::{NoProgress, ProgressEvent, ProgressSink, Stage};

pub mod geocoding;
pub use geocoding::{geocode_batch, Location, LocationDetails, NominatimPlace};

pub mod providers;
pub use providers::{
    Geocoder, HullKey, NetworkCache, NetworkRegion, NetworkType, RoadNetworkProvider,
    TransitProvider,
};

pub mod transit;
pub use transit::{Itinerary, Leg, TransitQuery};

pub mod routing;
pub use routing::{compute_school_routes, Modality, ModalityReport, RoutingOutcome};

pub mod segments;
pub use segments::{aggregate, aggregate_segments, collapse_duplicates, Segment, SegmentCounter};

pub mod merge;
pub use merge::{merge_polylines, overlay_segments, MergedPolyline, OverlaySegment};

pub mod render;
pub use render::{
    frequency_layer, modality_layer, radius_hints, LegendEntry, MapLayer, StepColormap,
};

pub mod project;
pub use project::{InMemoryProjectStore, NewProject, Project, ProjectStore, ProjectSummary};

pub mod planner;
pub use planner::{CreatedProject, ProjectRequest, SchoolRoutePlanner};

pub mod export;
pub use export::{read_address_list, write_project_archive, write_segments_csv, ProjectMetadata};

#[cfg(feature = "persistence")]
pub mod sqlite;
#[cfg(feature = "persistence")]
pub use sqlite::SqliteProjectStore;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{NominatimGeocoder, OtpTransitProvider};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in decimal degrees.
///
/// # Example
/// ```
/// use school_routes::Coordinate;
/// let point = Coordinate::new(52.5200, 13.4050); // Berlin
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate is finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Exact hashable identity of this coordinate.
    ///
    /// Two coordinates share a key iff they compare equal; `-0.0` and `0.0`
    /// map to the same key.
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey(canonical_bits(self.latitude), canonical_bits(self.longitude))
    }
}

/// Hashable identity of a [`Coordinate`], see [`Coordinate::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey(u64, u64);

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Bounding box of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A single walk, bicycle or transit-walk leg labelled with its modality.
///
/// A route with no points means "no route" for that candidate and modality
/// (out of radius or unreachable). It carries no weight in aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Modality label (the rule's display name)
    pub modality: String,
    /// Ordered coordinates from start to end
    pub points: Vec<Coordinate>,
}

impl Route {
    /// Create a route from its modality label and points.
    pub fn new(modality: impl Into<String>, points: Vec<Coordinate>) -> Self {
        Self {
            modality: modality.into(),
            points,
        }
    }

    /// An explicit "no route" entry for the given modality.
    pub fn empty(modality: impl Into<String>) -> Self {
        Self::new(modality, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of directed edges this route contributes.
    pub fn edge_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

// ============================================================================
// Tests
// ============================================================================
