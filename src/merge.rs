//! Polyline merging for compact rendering.
//!
//! Two views of a project's segments:
//! - [`merge_polylines`]: modality is dropped, edges sharing (start, end) are
//!   summed, then chained greedily into polylines of equal frequency.
//! - [`overlay_segments`]: edges are summed per (start, end, modality) and
//!   kept as individual tuples, one per rendered edge.
//!
//! The greedy chain is a single pass in input order. Identical edge sets fed
//! in a different order may chain differently.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use serde::Serialize;

use crate::segments::Segment;
use crate::{Coordinate, CoordinateKey};

/// A chain of directed edges sharing one frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedPolyline {
    pub points: Vec<Coordinate>,
    pub frequency: u32,
}

/// One edge of the modality overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySegment {
    pub start: Coordinate,
    pub end: Coordinate,
    pub frequency: u32,
    pub modality: String,
}

/// Merge segments into polylines of equal frequency.
pub fn merge_polylines(segments: &[Segment]) -> Vec<MergedPolyline> {
    // Collapse across modalities, keeping first-seen order
    let mut index: HashMap<(CoordinateKey, CoordinateKey), usize> = HashMap::new();
    let mut edges: Vec<(Coordinate, Coordinate, u32)> = Vec::new();
    for s in segments {
        match index.get(&(s.start.key(), s.end.key())) {
            Some(&idx) => edges[idx].2 += s.frequency,
            None => {
                index.insert((s.start.key(), s.end.key()), edges.len());
                edges.push((s.start, s.end, s.frequency));
            }
        }
    }

    let mut polylines: Vec<MergedPolyline> = Vec::new();
    // (last point, frequency) -> open polylines ending there, lowest index first
    let mut open_ends: HashMap<(CoordinateKey, u32), BTreeSet<usize>> = HashMap::new();

    for (start, end, frequency) in edges.iter().copied() {
        let candidate = open_ends
            .get_mut(&(start.key(), frequency))
            .and_then(|ends| ends.pop_first());

        let idx = match candidate {
            Some(idx) => {
                polylines[idx].points.push(end);
                idx
            }
            None => {
                polylines.push(MergedPolyline {
                    points: vec![start, end],
                    frequency,
                });
                polylines.len() - 1
            }
        };
        open_ends.entry((end.key(), frequency)).or_default().insert(idx);
    }

    debug!(
        "[PolylineMerger] {} segments -> {} edges -> {} polylines",
        segments.len(),
        edges.len(),
        polylines.len()
    );

    polylines
}

/// Sum segments per (start, end, modality) without chaining.
pub fn overlay_segments(segments: &[Segment]) -> Vec<OverlaySegment> {
    let mut index: HashMap<(CoordinateKey, CoordinateKey, &str), usize> = HashMap::new();
    let mut overlay: Vec<OverlaySegment> = Vec::new();

    for s in segments {
        let key = (s.start.key(), s.end.key(), s.modality.as_str());
        match index.get(&key) {
            Some(&idx) => overlay[idx].frequency += s.frequency,
            None => {
                index.insert(key, overlay.len());
                overlay.push(OverlaySegment {
                    start: s.start,
                    end: s.end,
                    frequency: s.frequency,
                    modality: s.modality.clone(),
                });
            }
        }
    }

    overlay
}
