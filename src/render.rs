//! Map layer inputs for the renderer.
//!
//! Turns a project's segments into GeoJSON feature collections with a color
//! per feature and a legend. Tile rendering and interactive widgets live in
//! the consumer; this module only fixes colors, geometry and tooltips.
//!
//! ## Color scales
//! - Frequency layer: green -> yellow -> red, stepped into `n_colors` bins
//!   between the smallest and largest merged frequency.
//! - Modality layer: blue -> orange -> purple, one bin per modality, indices
//!   assigned in first-seen order.

use std::collections::HashMap;

use geo::{LineString, Point};
use geojson::{Feature, FeatureCollection, Geometry, JsonValue, Value as GeoJsonValue};
use serde_json::json;

use crate::config::RoutingModalityConfig;
use crate::geo_utils::{compute_bounds, compute_center};
use crate::geocoding::Location;
use crate::merge::{merge_polylines, overlay_segments};
use crate::segments::Segment;
use crate::{Bounds, Coordinate};

/// Default number of frequency bins.
pub const DEFAULT_COLOR_STEPS: usize = 10;

const GREEN: [u8; 3] = [0x00, 0x80, 0x00];
const YELLOW: [u8; 3] = [0xff, 0xff, 0x00];
const RED: [u8; 3] = [0xff, 0x00, 0x00];
const BLUE: [u8; 3] = [0x00, 0x00, 0xff];
const ORANGE: [u8; 3] = [0xff, 0xa5, 0x00];
const PURPLE: [u8; 3] = [0x80, 0x00, 0x80];

// =============================================================================
// Colormap
// =============================================================================

type Rgb = [f64; 3];

fn to_unit(c: [u8; 3]) -> Rgb {
    [c[0] as f64 / 255.0, c[1] as f64 / 255.0, c[2] as f64 / 255.0]
}

fn to_hex(c: Rgb) -> String {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.9999) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(c[0]), channel(c[1]), channel(c[2]))
}

/// Evenly spaced anchors between `vmin` and `vmax`, interpolated linearly.
fn linear_color(anchors: &[Rgb], vmin: f64, vmax: f64, x: f64) -> Rgb {
    let last = anchors.len() - 1;
    if last == 0 || x <= vmin {
        return anchors[0];
    }
    if x >= vmax {
        return anchors[last];
    }

    let index = |i: usize| vmin + (vmax - vmin) * i as f64 / last as f64;
    let i = (0..=last).filter(|&i| index(i) < x).count();
    let (lo, hi) = (index(i - 1), index(i));
    let p = (x - lo) / (hi - lo);

    let (a, b) = (anchors[i - 1], anchors[i]);
    [
        (1.0 - p) * a[0] + p * b[0],
        (1.0 - p) * a[1] + p * b[1],
        (1.0 - p) * a[2] + p * b[2],
    ]
}

/// A linear colormap cut into `n` constant-color bins.
///
/// Bin `i` covers `[thresholds[i], thresholds[i + 1])`; values below the
/// first threshold take the first color, values at or above the last one take
/// the last color.
#[derive(Debug, Clone, PartialEq)]
pub struct StepColormap {
    thresholds: Vec<f64>,
    colors: Vec<Rgb>,
}

impl StepColormap {
    // Step a linear colormap through `anchors` on `[vmin, vmax]` into `n` bins,
    // `n` raised to at least 1
    fn linear(anchors: [[u8; 3]; 3], vmin: f64, vmax: f64, n: usize) -> Self {
        let anchors: Vec<Rgb> = anchors.into_iter().map(to_unit).collect();
        let n = n.max(1);

        let thresholds: Vec<f64> = (0..=n)
            .map(|i| vmin + (vmax - vmin) * i as f64 / n as f64)
            .collect();

        // Bin colors sweep the full scale: first bin at vmin, last at vmax
        let colors = (0..n)
            .map(|i| {
                let x = if n == 1 {
                    thresholds[0]
                } else {
                    let t = i as f64 / (n - 1) as f64;
                    thresholds[i] * (1.0 - t) + thresholds[i + 1] * t
                };
                linear_color(&anchors, vmin, vmax, x)
            })
            .collect();

        Self { thresholds, colors }
    }

    /// Green -> yellow -> red over `[vmin, vmax]`.
    pub fn frequency(vmin: f64, vmax: f64, n: usize) -> Self {
        Self::linear([GREEN, YELLOW, RED], vmin, vmax, n)
    }

    /// Blue -> orange -> purple, one bin per modality index.
    pub fn modality(count: usize) -> Self {
        let count = count.max(1);
        Self::linear([BLUE, ORANGE, PURPLE], 0.0, (count - 1) as f64, count)
    }

    /// Hex color of `value`.
    pub fn color(&self, value: f64) -> String {
        let last = self.thresholds.len() - 1;
        if value <= self.thresholds[0] {
            return to_hex(self.colors[0]);
        }
        if value >= self.thresholds[last] {
            return to_hex(self.colors[self.colors.len() - 1]);
        }
        let i = self.thresholds.iter().filter(|&&t| t < value).count();
        to_hex(self.colors[i - 1])
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// `(lower, upper, hex color)` of every bin.
    pub fn steps(&self) -> Vec<(f64, f64, String)> {
        self.colors
            .iter()
            .enumerate()
            .map(|(i, c)| (self.thresholds[i], self.thresholds[i + 1], to_hex(*c)))
            .collect()
    }
}

// =============================================================================
// Layers
// =============================================================================

/// One legend row.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
}

/// A renderable layer: features plus the view and legend to show them with.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    /// Mean of all segment endpoints
    pub center: Coordinate,
    pub bounds: Bounds,
    pub features: FeatureCollection,
    pub legend: Vec<LegendEntry>,
}

fn feature(geometry: GeoJsonValue, properties: JsonValue) -> Feature {
    let properties = match properties {
        JsonValue::Object(map) => Some(map),
        _ => None,
    };
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties,
        foreign_members: None,
    }
}

fn line(points: &[Coordinate]) -> GeoJsonValue {
    let line: LineString<f64> = points.iter().map(|p| (p.longitude, p.latitude)).collect();
    GeoJsonValue::from(&line)
}

fn endpoints(segments: &[Segment]) -> Vec<Coordinate> {
    segments.iter().flat_map(|s| [s.start, s.end]).collect()
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Merged polylines colored by frequency.
///
/// Returns `None` for an empty segment list.
pub fn frequency_layer(segments: &[Segment], n_colors: usize) -> Option<MapLayer> {
    let points = endpoints(segments);
    let center = compute_center(&points)?;
    let bounds = compute_bounds(&points)?;

    let merged = merge_polylines(segments);
    let min_freq = merged.iter().map(|m| m.frequency).min()?;
    let max_freq = merged.iter().map(|m| m.frequency).max()?;
    let colormap = StepColormap::frequency(min_freq as f64, max_freq as f64, n_colors);

    let features = merged
        .iter()
        .map(|m| {
            feature(
                line(&m.points),
                json!({
                    "color": colormap.color(m.frequency as f64),
                    "frequency": m.frequency,
                    "tooltip": format!("Frequency: {}", m.frequency),
                }),
            )
        })
        .collect();

    let legend = colormap
        .steps()
        .into_iter()
        .map(|(lo, hi, color)| LegendEntry {
            label: format!("{:.1} - {:.1}", lo, hi),
            color,
        })
        .collect();

    Some(MapLayer {
        center,
        bounds,
        features: collection(features),
        legend,
    })
}

/// Per-edge overlay colored by modality.
///
/// Returns `None` for an empty segment list.
pub fn modality_layer(segments: &[Segment]) -> Option<MapLayer> {
    let points = endpoints(segments);
    let center = compute_center(&points)?;
    let bounds = compute_bounds(&points)?;

    let mut modalities: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for s in segments {
        if !index.contains_key(s.modality.as_str()) {
            index.insert(s.modality.as_str(), modalities.len());
            modalities.push(s.modality.as_str());
        }
    }
    let colormap = StepColormap::modality(modalities.len());

    let features = overlay_segments(segments)
        .iter()
        .map(|o| {
            let idx = index.get(o.modality.as_str()).copied().unwrap_or(0);
            feature(
                line(&[o.start, o.end]),
                json!({
                    "color": colormap.color(idx as f64),
                    "frequency": o.frequency,
                    "modality": o.modality,
                    "tooltip": format!("Modality: {}, Frequency: {}", o.modality, o.frequency),
                }),
            )
        })
        .collect();

    let legend = modalities
        .iter()
        .enumerate()
        .map(|(i, m)| LegendEntry {
            label: m.to_string(),
            color: colormap.color(i as f64),
        })
        .collect();

    Some(MapLayer {
        center,
        bounds,
        features: collection(features),
        legend,
    })
}

/// One point feature per modality rule at the main location, carrying the
/// rule's `max_radius` in meters (`null` when unbounded).
pub fn radius_hints(main: &Location, config: &RoutingModalityConfig) -> FeatureCollection {
    let Some(center) = main.coordinate else {
        return collection(Vec::new());
    };
    let point = GeoJsonValue::from(&Point::new(center.longitude, center.latitude));

    let features = config
        .rules
        .iter()
        .map(|rule| {
            let tooltip = match rule.max_radius {
                Some(r) => format!("Max radius for {}: {} m", rule.display_name(), r),
                None => format!("No max radius for {}", rule.display_name()),
            };
            feature(
                point.clone(),
                json!({
                    "modality": rule.display_name(),
                    "min_radius": rule.min_radius,
                    "max_radius": rule.max_radius,
                    "tooltip": tooltip,
                }),
            )
        })
        .collect();

    collection(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModalityRule;

    fn seg(start: (f64, f64), end: (f64, f64), modality: &str, frequency: u32) -> Segment {
        Segment {
            start: Coordinate::from(start),
            end: Coordinate::from(end),
            modality: modality.to_string(),
            frequency,
        }
    }

    fn prop<'a>(f: &'a Feature, key: &str) -> &'a JsonValue {
        &f.properties.as_ref().unwrap()[key]
    }

    #[test]
    fn test_step_colormap_ends() {
        let cmap = StepColormap::frequency(1.0, 10.0, 10);
        assert_eq!(cmap.len(), 10);
        assert_eq!(cmap.color(1.0), "#008000");
        assert_eq!(cmap.color(0.0), "#008000");
        assert_eq!(cmap.color(10.0), "#ff0000");
        assert_eq!(cmap.color(99.0), "#ff0000");
    }

    #[test]
    fn test_step_colormap_bins() {
        let cmap = StepColormap::frequency(0.0, 10.0, 2);
        // first bin green, second bin red
        assert_eq!(cmap.color(2.0), "#008000");
        assert_eq!(cmap.color(5.0), "#008000");
        assert_eq!(cmap.color(5.5), "#ff0000");
        assert_eq!(cmap.steps()[1].0, 5.0);
    }

    #[test]
    fn test_step_colormap_midpoint_is_yellow() {
        let cmap = StepColormap::frequency(0.0, 2.0, 3);
        assert_eq!(cmap.color(1.0), "#ffff00");
    }

    #[test]
    fn test_degenerate_ranges() {
        let flat = StepColormap::frequency(3.0, 3.0, 10);
        assert_eq!(flat.color(3.0), "#008000");

        let single = StepColormap::modality(1);
        assert_eq!(single.len(), 1);
        assert_eq!(single.color(0.0), "#0000ff");

        let none = StepColormap::modality(0);
        assert_eq!(none.len(), 1);
        assert_eq!(none.color(5.0), "#0000ff");

        let no_bins = StepColormap::frequency(1.0, 8.0, 0);
        assert_eq!(no_bins.len(), 1);
        assert_eq!(no_bins.steps().len(), 1);

        let three = StepColormap::modality(3);
        assert_eq!(three.color(0.0), "#0000ff");
        assert_eq!(three.color(1.0), "#ffa500");
        assert_eq!(three.color(2.0), "#800080");
    }

    #[test]
    fn test_frequency_layer() {
        let segments = vec![
            seg((52.0, 13.0), (52.001, 13.0), "walk", 2),
            seg((52.001, 13.0), (52.002, 13.0), "walk", 2),
            seg((52.002, 13.0), (52.003, 13.0), "walk", 1),
        ];
        let layer = frequency_layer(&segments, DEFAULT_COLOR_STEPS).unwrap();

        assert_eq!(layer.features.features.len(), 2);
        assert_eq!(layer.legend.len(), DEFAULT_COLOR_STEPS);

        let first = &layer.features.features[0];
        assert_eq!(prop(first, "frequency"), &json!(2));
        assert_eq!(prop(first, "color"), &json!("#ff0000"));
        assert_eq!(prop(&layer.features.features[1], "color"), &json!("#008000"));

        match &first.geometry.as_ref().unwrap().value {
            GeoJsonValue::LineString(coords) => {
                assert_eq!(coords.len(), 3);
                assert_eq!(coords[0], vec![13.0, 52.0]);
            }
            other => panic!("unexpected geometry {:?}", other),
        }

        assert!((layer.center.latitude - 52.0015).abs() < 1e-9);
        assert_eq!(layer.bounds.max_lat, 52.003);
    }

    #[test]
    fn test_modality_layer_first_seen_colors() {
        let segments = vec![
            seg((52.0, 13.0), (52.001, 13.0), "Zu Fuß", 3),
            seg((52.0, 13.0), (52.001, 13.0), "Fahrrad", 1),
            seg((52.001, 13.0), (52.002, 13.0), "Zu Fuß", 1),
        ];
        let layer = modality_layer(&segments).unwrap();

        assert_eq!(layer.features.features.len(), 3);
        assert_eq!(
            layer.legend,
            vec![
                LegendEntry { label: "Zu Fuß".into(), color: "#0000ff".into() },
                LegendEntry { label: "Fahrrad".into(), color: "#800080".into() },
            ]
        );
        assert_eq!(prop(&layer.features.features[1], "color"), &json!("#800080"));
    }

    #[test]
    fn test_empty_segments_yield_no_layer() {
        assert!(frequency_layer(&[], 10).is_none());
        assert!(modality_layer(&[]).is_none());
    }

    #[test]
    fn test_radius_hints() {
        let config = RoutingModalityConfig::new(
            vec![
                ModalityRule::new("walk", 0.0, Some(1500.0)).with_display_name("Zu Fuß"),
                ModalityRule::new("public_transport_walking", 1500.0, None),
            ],
            1,
        )
        .unwrap();
        let main = Location::new("Schule", Coordinate::new(52.0, 13.0));
        let hints = radius_hints(&main, &config);

        assert_eq!(hints.features.len(), 2);
        assert_eq!(prop(&hints.features[0], "max_radius"), &json!(1500.0));
        assert_eq!(prop(&hints.features[0], "tooltip"), &json!("Max radius for Zu Fuß: 1500 m"));
        assert_eq!(prop(&hints.features[1], "max_radius"), &JsonValue::Null);
    }
}
