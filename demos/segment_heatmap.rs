//! Offline walk-through of project creation and map layers.
//!
//! Uses a street grid in place of a real road network and a fixed address
//! book in place of Nominatim, so it runs without any external service.
//!
//! Run with: RUST_LOG=debug cargo run --example segment_heatmap

use std::collections::HashMap;
use std::io::Cursor;

use school_routes::{
    frequency_layer, modality_layer, radius_hints, write_project_archive, Coordinate, Geocoder,
    InMemoryProjectStore, Itinerary, Location, NetworkRegion, NetworkType, ProgressEvent,
    ProjectRequest, RoadNetworkProvider, Result, RoutingModalityConfig, SchoolRoutePlanner,
    TransitProvider, TransitQuery,
};

/// Street grid with blocks of `step` degrees: paths go north/south first,
/// then east/west.
struct GridStreets {
    step: f64,
}

impl RoadNetworkProvider for GridStreets {
    type Network = ();

    fn load_network(&self, network_type: NetworkType, region: &NetworkRegion) -> Result<()> {
        println!(
            "   loading {} grid ({} hull vertices, buffer {:.4} deg)",
            network_type,
            region.hull.exterior().0.len(),
            region.buffer_degrees
        );
        Ok(())
    }

    fn shortest_path(
        &self,
        _network: &(),
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<Coordinate>> {
        let snap = |v: f64| (v / self.step).round() * self.step;
        let (lat0, lon0) = (snap(origin.latitude), snap(origin.longitude));
        let (lat1, lon1) = (snap(destination.latitude), snap(destination.longitude));

        let mut path = vec![Coordinate::new(lat0, lon0)];
        let lat_steps = ((lat1 - lat0) / self.step).round() as i64;
        let lon_steps = ((lon1 - lon0) / self.step).round() as i64;
        for i in 1..=lat_steps.abs() {
            path.push(Coordinate::new(lat0 + (i * lat_steps.signum()) as f64 * self.step, lon0));
        }
        for i in 1..=lon_steps.abs() {
            path.push(Coordinate::new(lat1, lon0 + (i * lon_steps.signum()) as f64 * self.step));
        }
        Ok(path)
    }
}

/// No public transport in this demo.
struct NoTransit;

impl TransitProvider for NoTransit {
    fn plan(&self, _query: &TransitQuery) -> Result<Vec<Itinerary>> {
        Ok(Vec::new())
    }
}

struct AddressBook(HashMap<String, Coordinate>);

impl Geocoder for AddressBook {
    fn search(&self, text: &str, limit: usize) -> Result<Vec<Location>> {
        Ok(self
            .0
            .get(text)
            .map(|c| Location::new(text, *c))
            .into_iter()
            .take(limit)
            .collect())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let school = Location::new("Grundschule am Park", Coordinate::new(52.52, 13.405));

    let mut book = HashMap::new();
    let mut addresses = Vec::new();
    let offsets = [(3, 2), (3, 4), (5, 2), (-2, 1), (-4, -3), (1, -6), (12, 9), (20, -15)];
    for (i, (dlat, dlon)) in offsets.iter().enumerate() {
        let address = format!("Musterweg {}", i + 1);
        book.insert(
            address.clone(),
            Coordinate::new(52.52 + *dlat as f64 * 0.001, 13.405 + *dlon as f64 * 0.001),
        );
        addresses.push(address);
    }

    let config = RoutingModalityConfig::from_json_str(
        r#"{
            "routing": [
                {"modality": "walk", "modality_display_name": "Zu Fuß",
                 "min_radius": 0, "max_radius": 1000},
                {"modality": "bicycle", "modality_display_name": "Fahrrad",
                 "min_radius": 500, "max_radius": -1},
                {"modality": "skateboard", "min_radius": 0}
            ],
            "min_segment_frequency": 1
        }"#,
    )?;

    let mut planner = SchoolRoutePlanner::new(
        AddressBook(book),
        GridStreets { step: 0.001 },
        NoTransit,
        config.clone(),
    );
    let mut store = InMemoryProjectStore::new();

    println!("School Route Heatmap Example\n");
    println!("1. Creating project for {} addresses:", addresses.len());
    let mut sink = |event: &ProgressEvent| println!("   {}", event);
    let created = planner.create_project(
        ProjectRequest {
            main_location: school.clone(),
            name: None,
            addresses,
            force: false,
        },
        &mut store,
        &mut sink,
    )?;

    let project = &created.project;
    println!("\n2. Project '{}' (id {})", project.display_name(), project.id);
    for report in &created.reports {
        println!(
            "   {}: {} routed, {} out of range, {} unreachable",
            report.label, report.routed, report.out_of_range, report.unreachable
        );
    }
    for warning in &created.warnings {
        println!("   warning: {}", warning);
    }
    println!("   {} segments stored", project.segments.len());

    println!("\n3. Frequency layer:");
    if let Some(layer) = frequency_layer(&project.segments, 10) {
        println!("   center: {:.5}, {:.5}", layer.center.latitude, layer.center.longitude);
        println!("   {} polylines", layer.features.features.len());
        for entry in layer.legend.iter().take(3) {
            println!("   {} {}", entry.color, entry.label);
        }
    }

    println!("\n4. Modality layer:");
    if let Some(layer) = modality_layer(&project.segments) {
        for entry in &layer.legend {
            println!("   {} {}", entry.color, entry.label);
        }
        println!("   {} edges", layer.features.features.len());
    }

    let hints = radius_hints(&school, &config);
    println!("\n5. {} radius hints", hints.features.len());

    let archive = write_project_archive(project, Cursor::new(Vec::new()))?;
    println!("\n6. Export archive: {} bytes", archive.into_inner().len());

    Ok(())
}
