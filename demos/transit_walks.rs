//! Walking parts of a public transport trip, from live services.
//!
//! Needs a Nominatim and an OpenTripPlanner instance, located through
//! `NOMINATIM_HOST_PORT` and `OTP_HOST_PORT`.
//!
//! Run with: cargo run --features http --example transit_walks -- "<school>" "<address>"

use chrono::Local;
use school_routes::config::DEFAULT_TRANSPORT_MODES;
use school_routes::transit::{shortest_itinerary, walking_routes};
use school_routes::{
    geo_utils, Geocoder, NominatimGeocoder, OtpTransitProvider, ServiceEndpoints, TransitProvider,
    TransitQuery,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("usage: transit_walks <school> <address>");
        std::process::exit(2);
    }

    let endpoints = ServiceEndpoints::from_env();
    let geocoder = NominatimGeocoder::from_endpoints(&endpoints)?;
    let planner = OtpTransitProvider::from_endpoints(&endpoints)?;

    let school = geocoder.top_match(&args[0])?.ok_or("school not found")?;
    let home = geocoder.top_match(&args[1])?.ok_or("address not found")?;
    let (Some(origin), Some(destination)) = (school.coordinate, home.coordinate) else {
        return Err("geocoding returned no coordinates".into());
    };

    println!("From: {}", school.label());
    println!("To:   {}", home.label());
    println!("Distance: {:.0} m\n", geo_utils::haversine_distance(&origin, &destination));

    let modes = DEFAULT_TRANSPORT_MODES.iter().map(|m| m.to_string()).collect();
    let query = TransitQuery::anchored(origin, destination, Local::now().naive_local(), modes);
    println!("Departure: {} {}", query.date_string(), query.time_string());

    let itineraries = planner.plan(&query)?;
    let Some(itinerary) = shortest_itinerary(&itineraries) else {
        println!("No itinerary found");
        return Ok(());
    };

    println!(
        "Shortest of {} itineraries: {} min, legs: {}",
        itineraries.len(),
        itinerary.duration().num_minutes(),
        itinerary.legs.iter().map(|l| l.mode.as_str()).collect::<Vec<_>>().join(" > ")
    );

    for (i, route) in walking_routes(itinerary, destination, "transit")?.iter().enumerate() {
        println!(
            "  walk {}: {} points, {:.0} m",
            i + 1,
            route.points.len(),
            geo_utils::polyline_length(&route.points)
        );
    }

    Ok(())
}
