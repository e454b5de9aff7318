//! Segment aggregation.
//!
//! Turns a batch of routes into directed, frequency-weighted street segments:
//! - Every coordinate is rounded to 5 decimals so sub-meter noise bins together
//! - Each consecutive pair of a rounded route is one directed edge
//! - Edges are counted per (start, end, modality), one count per traversal
//! - Edges below the minimum frequency are dropped
//!
//! Output follows first-seen order of the edges. Callers should not rely on it.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::RoutingModalityConfig;
use crate::geo_utils::{round_route, DEFAULT_PRECISION};
use crate::{Coordinate, CoordinateKey, Route};

/// A directed, frequency-weighted street edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Coordinate,
    pub end: Coordinate,
    /// Modality label of the routes that traversed this edge
    pub modality: String,
    /// Number of traversals
    pub frequency: u32,
}

type EdgeKey = (CoordinateKey, CoordinateKey, String);

// Counter entry, kept in first-seen order
#[derive(Debug)]
struct EdgeCount {
    start: Coordinate,
    end: Coordinate,
    modality: String,
    count: u32,
}

/// Incremental edge counter.
///
/// Feed routes one at a time with [`SegmentCounter::add_route`], then call
/// [`SegmentCounter::finish`] with the frequency threshold.
#[derive(Debug, Default)]
pub struct SegmentCounter {
    index: HashMap<EdgeKey, usize>,
    edges: Vec<EdgeCount>,
    routes_seen: usize,
    routes_empty: usize,
}

impl SegmentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every directed edge of `route` after rounding.
    pub fn add_route(&mut self, route: &Route) {
        self.routes_seen += 1;
        if route.is_empty() {
            self.routes_empty += 1;
            return;
        }

        let rounded = round_route(&route.points, DEFAULT_PRECISION);
        for pair in rounded.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let key = (start.key(), end.key(), route.modality.clone());

            match self.index.get(&key) {
                Some(&idx) => self.edges[idx].count += 1,
                None => {
                    self.index.insert(key, self.edges.len());
                    self.edges.push(EdgeCount {
                        start,
                        end,
                        modality: route.modality.clone(),
                        count: 1,
                    });
                }
            }
        }
    }

    /// Number of distinct directed edges counted so far.
    pub fn distinct_edges(&self) -> usize {
        self.edges.len()
    }

    /// Emit every edge with at least `min_frequency` traversals.
    pub fn finish(self, min_frequency: u32) -> Vec<Segment> {
        let distinct = self.edges.len();
        let segments: Vec<Segment> = self
            .edges
            .into_iter()
            .filter(|e| e.count >= min_frequency)
            .map(|e| Segment {
                start: e.start,
                end: e.end,
                modality: e.modality,
                frequency: e.count,
            })
            .collect();

        debug!(
            "[SegmentAggregator] {} routes ({} empty) -> {} edges, {} kept at min frequency {}",
            self.routes_seen,
            self.routes_empty,
            distinct,
            segments.len(),
            min_frequency
        );

        segments
    }
}

/// Aggregate routes into segments with at least `min_frequency` traversals.
pub fn aggregate_segments(routes: &[Route], min_frequency: u32) -> Vec<Segment> {
    let mut counter = SegmentCounter::new();
    for route in routes {
        counter.add_route(route);
    }
    counter.finish(min_frequency)
}

/// Aggregate routes using the configuration's `min_segment_frequency`.
pub fn aggregate(routes: &[Route], config: &RoutingModalityConfig) -> Vec<Segment> {
    aggregate_segments(routes, config.min_segment_frequency)
}

/// Merge segments sharing (start, end, modality) by summing frequencies.
///
/// Keeps the first occurrence's position and coordinates.
pub fn collapse_duplicates(segments: Vec<Segment>) -> Vec<Segment> {
    let mut index: HashMap<EdgeKey, usize> = HashMap::with_capacity(segments.len());
    let mut collapsed: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let key = (segment.start.key(), segment.end.key(), segment.modality.clone());
        match index.get(&key) {
            Some(&idx) => collapsed[idx].frequency += segment.frequency,
            None => {
                index.insert(key, collapsed.len());
                collapsed.push(segment);
            }
        }
    }
    collapsed
}
