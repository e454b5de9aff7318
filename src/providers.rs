//! Contracts of the external collaborators and the road network cache.
//!
//! Geocoding, shortest-path search and transit planning are performed by
//! external services. This module only fixes their request/response shape:
//!
//! | Trait | Collaborator |
//! |-------|--------------|
//! | [`Geocoder`] | free-text address search (Nominatim) |
//! | [`RoadNetworkProvider`] | walk/bike street graph and shortest paths |
//! | [`TransitProvider`] | public transport itineraries (OpenTripPlanner) |
//!
//! Road networks are fetched for the convex hull of the run's locations and
//! reused for every shortest-path query of that run through [`NetworkCache`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use geo::Polygon;
use log::{debug, info};

use crate::error::Result;
use crate::geo_utils::{self, METERS_PER_DEGREE};
use crate::geocoding::Location;
use crate::transit::{Itinerary, TransitQuery};
use crate::Coordinate;

/// Free-text geocoding service.
pub trait Geocoder {
    /// Ranked candidates for `text`, possibly empty.
    fn search(&self, text: &str, limit: usize) -> Result<Vec<Location>>;

    /// Best candidate for `text`, if any.
    fn top_match(&self, text: &str) -> Result<Option<Location>> {
        Ok(self.search(text, 1)?.into_iter().next())
    }
}

/// Street network type requested from the road network provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkType {
    Walk,
    Bike,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Road network service: builds a street graph for a region and answers
/// shortest-path queries on it.
///
/// The network is immutable once loaded and may be shared between queries.
pub trait RoadNetworkProvider {
    type Network;

    /// Fetch the street network covering `region`.
    fn load_network(
        &self,
        network_type: NetworkType,
        region: &NetworkRegion,
    ) -> Result<Self::Network>;

    /// Shortest path by length from `origin` to `destination`, snapped to the
    /// nearest network nodes. Empty if unreachable.
    fn shortest_path(
        &self,
        network: &Self::Network,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<Coordinate>>;
}

/// Public transport trip planner.
pub trait TransitProvider {
    /// All itineraries the planner returns for the query, in response order.
    fn plan(&self, query: &TransitQuery) -> Result<Vec<Itinerary>>;
}

// =============================================================================
// Region and cache
// =============================================================================

/// Area a road network is fetched for: the convex hull of the run's
/// locations plus a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRegion {
    /// Hull in (x = longitude, y = latitude)
    pub hull: Polygon<f64>,
    /// Buffer to apply around the hull, in degrees
    pub buffer_degrees: f64,
}

impl NetworkRegion {
    /// Region around `points` with a buffer of `buffer_meters`.
    pub fn around(points: &[Coordinate], buffer_meters: f64) -> Self {
        Self {
            hull: geo_utils::convex_hull(points),
            buffer_degrees: buffer_meters / METERS_PER_DEGREE,
        }
    }

    /// Canonical cache key for this region and network type.
    pub fn key(&self, network_type: NetworkType) -> HullKey {
        const SCALE: f64 = 1e6;
        let mut vertices: Vec<(i64, i64)> = self
            .hull
            .exterior()
            .coords()
            .map(|c| ((c.y * SCALE).round() as i64, (c.x * SCALE).round() as i64))
            .collect();
        // Closed rings repeat their first vertex, and the starting vertex is
        // arbitrary; sort + dedup gives an order independent key.
        vertices.sort_unstable();
        vertices.dedup();

        HullKey {
            network_type,
            buffer_micro_degrees: (self.buffer_degrees * SCALE).round() as i64,
            vertices,
        }
    }
}

/// Canonical identity of a fetched road network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HullKey {
    pub network_type: NetworkType,
    pub buffer_micro_degrees: i64,
    /// Hull vertices as (lat, lon) in micro-degrees
    pub vertices: Vec<(i64, i64)>,
}

/// Memo table of loaded road networks, owned by a planner run.
///
/// Networks are immutable once fetched, so entries are never invalidated.
#[derive(Debug)]
pub struct NetworkCache<N> {
    entries: HashMap<HullKey, Arc<N>>,
    hits: u32,
    misses: u32,
}

impl<N> Default for NetworkCache<N> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<N> NetworkCache<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached network for `key`, loading it with `load` on a miss.
    /// A failed load leaves the cache unchanged.
    pub fn get_or_load<F>(&mut self, key: HullKey, load: F) -> Result<Arc<N>>
    where
        F: FnOnce() -> Result<N>,
    {
        if let Some(network) = self.entries.get(&key) {
            self.hits += 1;
            debug!(
                "[NetworkCache] Hit for {} network ({} hull vertices)",
                key.network_type,
                key.vertices.len()
            );
            return Ok(Arc::clone(network));
        }

        self.misses += 1;
        info!(
            "[NetworkCache] Loading {} network ({} hull vertices)",
            key.network_type,
            key.vertices.len()
        );
        let network = Arc::new(load()?);
        self.entries.insert(key, Arc::clone(&network));
        Ok(network)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(52.0, 13.0),
            Coordinate::new(52.0, 13.1),
            Coordinate::new(52.1, 13.1),
            Coordinate::new(52.1, 13.0),
        ]
    }

    #[test]
    fn test_region_key_ignores_input_order_and_interior_points() {
        let mut shuffled = square();
        shuffled.reverse();
        shuffled.push(Coordinate::new(52.05, 13.05));

        let a = NetworkRegion::around(&square(), 2000.0).key(NetworkType::Walk);
        let b = NetworkRegion::around(&shuffled, 2000.0).key(NetworkType::Walk);
        assert_eq!(a, b);
        assert_eq!(a.vertices.len(), 4);
    }

    #[test]
    fn test_region_key_distinguishes_type_and_buffer() {
        let region = NetworkRegion::around(&square(), 2000.0);
        assert_ne!(region.key(NetworkType::Walk), region.key(NetworkType::Bike));

        let wider = NetworkRegion::around(&square(), 3000.0);
        assert_ne!(region.key(NetworkType::Walk), wider.key(NetworkType::Walk));
    }

    #[test]
    fn test_buffer_conversion() {
        let region = NetworkRegion::around(&square(), 111_320.0);
        assert!((region.buffer_degrees - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cache_loads_once() {
        let mut cache: NetworkCache<String> = NetworkCache::new();
        let key = NetworkRegion::around(&square(), 2000.0).key(NetworkType::Walk);

        let mut loads = 0;
        let first = cache
            .get_or_load(key.clone(), || {
                loads += 1;
                Ok("graph".to_string())
            })
            .unwrap();
        let second = cache
            .get_or_load(key, || {
                loads += 1;
                Ok("other".to_string())
            })
            .unwrap();

        assert_eq!(loads, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_failed_load_not_stored() {
        let mut cache: NetworkCache<String> = NetworkCache::new();
        let key = NetworkRegion::around(&square(), 2000.0).key(NetworkType::Bike);

        let result = cache.get_or_load(key.clone(), || Err(Error::Network("unreachable".into())));
        assert!(result.is_err());
        assert!(cache.is_empty());

        let retry = cache.get_or_load(key, || Ok("graph".to_string()));
        assert!(retry.is_ok());
    }
}
