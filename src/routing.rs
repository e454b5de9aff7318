//! Modality routing policy.
//!
//! For every configured modality rule and every candidate address, decides
//! whether the candidate lies inside the rule's radius ring around the main
//! location and, if so, asks the matching provider for a route.
//!
//! ## Rules
//! - A candidate outside the ring contributes an explicit empty route.
//! - Rules are evaluated independently; overlapping rings route a candidate
//!   under several modalities.
//! - Unknown modality keys are skipped with a warning.
//! - Provider failures abort the run; an empty path does not.
//! - Candidates are processed one at a time, in input order.

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::config::{ModalityRule, RoutingModalityConfig};
use crate::error::{Error, Result};
use crate::geo_utils::haversine_distance;
use crate::geocoding::Location;
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::providers::{
    NetworkCache, NetworkRegion, NetworkType, RoadNetworkProvider, TransitProvider,
};
use crate::transit::{shortest_itinerary, walking_routes, TransitQuery};
use crate::{Coordinate, Route};

/// Modalities the policy knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Walk,
    Bicycle,
    PublicTransportWalking,
}

impl Modality {
    /// Parse a configuration key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "walk" => Some(Modality::Walk),
            "bicycle" => Some(Modality::Bicycle),
            "public_transport_walking" => Some(Modality::PublicTransportWalking),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Modality::Walk => "walk",
            Modality::Bicycle => "bicycle",
            Modality::PublicTransportWalking => "public_transport_walking",
        }
    }

    /// Road network used by this modality, `None` for transit.
    pub fn network_type(&self) -> Option<NetworkType> {
        match self {
            Modality::Walk => Some(NetworkType::Walk),
            Modality::Bicycle => Some(NetworkType::Bike),
            Modality::PublicTransportWalking => None,
        }
    }
}

/// Per-rule counts for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalityReport {
    /// Rule display name
    pub label: String,
    /// Candidates inside the radius ring that produced a path
    pub routed: usize,
    /// Candidates outside the radius ring
    pub out_of_range: usize,
    /// Candidates inside the ring without a path
    pub unreachable: usize,
    /// Routes emitted, including empty ones
    pub routes: usize,
}

/// Everything a routing run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingOutcome {
    pub routes: Vec<Route>,
    pub reports: Vec<ModalityReport>,
    /// Non-fatal problems, e.g. unknown modality keys
    pub warnings: Vec<String>,
}

/// Compute the routes of every candidate under every configured modality.
///
/// Routes run from the main location to each candidate. Candidates without
/// coordinates are skipped. `now` is anchored to Monday 07:00 for transit
/// queries.
#[allow(clippy::too_many_arguments)]
pub fn compute_school_routes<R, T>(
    main: &Location,
    candidates: &[Location],
    config: &RoutingModalityConfig,
    road: &R,
    transit: &T,
    cache: &mut NetworkCache<R::Network>,
    now: NaiveDateTime,
    progress: &mut dyn ProgressSink,
) -> Result<RoutingOutcome>
where
    R: RoadNetworkProvider + ?Sized,
    T: TransitProvider + ?Sized,
{
    let origin = main
        .coordinate
        .filter(|c| c.is_valid())
        .ok_or_else(|| Error::MissingCoordinates(main.label()))?;

    let targets: Vec<Coordinate> = candidates
        .iter()
        .filter_map(|loc| loc.coordinate.filter(|c| c.is_valid()))
        .collect();
    if targets.len() < candidates.len() {
        debug!(
            "[Routing] Skipping {} candidates without coordinates",
            candidates.len() - targets.len()
        );
    }

    let mut outcome = RoutingOutcome::default();
    let rule_count = config.rules.len();

    for (rule_idx, rule) in config.rules.iter().enumerate() {
        let stage_label = format!("[{}/{}] {}", rule_idx + 1, rule_count, rule.display_name());

        let Some(modality) = Modality::from_key(&rule.modality) else {
            let warning = format!("Unknown routing modality: {}", rule.modality);
            warn!("[Routing] {}", warning);
            outcome.warnings.push(warning);
            continue;
        };

        let mut report = ModalityReport {
            label: rule.display_name().to_string(),
            ..ModalityReport::default()
        };

        let routes = match modality.network_type() {
            Some(network_type) => route_on_network(
                origin,
                &targets,
                rule,
                network_type,
                road,
                cache,
                &stage_label,
                &mut report,
                progress,
            )?,
            None => route_with_transit(
                origin,
                &targets,
                rule,
                transit,
                now,
                &stage_label,
                &mut report,
                progress,
            )?,
        };

        report.routes = routes.len();
        info!(
            "[Routing] {}: {} routed, {} out of range, {} unreachable, {} routes",
            report.label, report.routed, report.out_of_range, report.unreachable, report.routes
        );
        outcome.routes.extend(routes);
        outcome.reports.push(report);
    }

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn route_on_network<R>(
    origin: Coordinate,
    targets: &[Coordinate],
    rule: &ModalityRule,
    network_type: NetworkType,
    road: &R,
    cache: &mut NetworkCache<R::Network>,
    stage_label: &str,
    report: &mut ModalityReport,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<Route>>
where
    R: RoadNetworkProvider + ?Sized,
{
    let label = rule.display_name();
    let in_range: Vec<bool> = targets
        .iter()
        .map(|t| rule.includes(haversine_distance(&origin, t)))
        .collect();

    // Only fetch a network if someone will be routed on it
    let network = if in_range.iter().any(|&r| r) {
        let mut region_points = Vec::with_capacity(targets.len() + 1);
        region_points.push(origin);
        region_points.extend_from_slice(targets);
        let region = NetworkRegion::around(&region_points, rule.buffer_meters());

        progress.report(&ProgressEvent::new(
            Stage::LoadingNetwork,
            0,
            0,
            format!("{} {} network", stage_label, network_type),
        ));
        Some(cache.get_or_load(region.key(network_type), || {
            road.load_network(network_type, &region)
        })?)
    } else {
        None
    };

    let total = targets.len();
    let mut routes = Vec::with_capacity(total);

    for (i, (target, inside)) in targets.iter().zip(in_range).enumerate() {
        let network = match (&network, inside) {
            (Some(network), true) => network,
            _ => {
                report.out_of_range += 1;
                routes.push(Route::empty(label));
                continue;
            }
        };

        progress.report(&ProgressEvent::new(Stage::Routing, i + 1, total, stage_label));
        let path = road.shortest_path(network, origin, *target)?;
        if path.is_empty() {
            report.unreachable += 1;
        } else {
            report.routed += 1;
        }
        routes.push(Route::new(label, path));
    }

    Ok(routes)
}

#[allow(clippy::too_many_arguments)]
fn route_with_transit<T>(
    origin: Coordinate,
    targets: &[Coordinate],
    rule: &ModalityRule,
    transit: &T,
    now: NaiveDateTime,
    stage_label: &str,
    report: &mut ModalityReport,
    progress: &mut dyn ProgressSink,
) -> Result<Vec<Route>>
where
    T: TransitProvider + ?Sized,
{
    let label = rule.display_name();
    let modes = rule.transport_modes();
    let total = targets.len();
    let mut routes = Vec::new();

    for (i, target) in targets.iter().enumerate() {
        if !rule.includes(haversine_distance(&origin, target)) {
            report.out_of_range += 1;
            routes.push(Route::empty(label));
            continue;
        }

        progress.report(&ProgressEvent::new(Stage::Routing, i + 1, total, stage_label));
        let query = TransitQuery::anchored(origin, *target, now, modes.clone());
        let itineraries = transit.plan(&query)?;

        match shortest_itinerary(&itineraries) {
            Some(itinerary) => {
                report.routed += 1;
                routes.extend(walking_routes(itinerary, *target, label)?);
            }
            None => {
                report.unreachable += 1;
                routes.push(Route::empty(label));
            }
        }
    }

    Ok(routes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::transit::{Itinerary, Leg, LegGeometry};
    use chrono::DateTime;
    use geo::{Coord, LineString};
    use std::cell::{Cell, RefCell};

    /// Road network that routes along the straight line, in `steps` hops.
    pub(crate) struct StraightLineRoads {
        pub steps: usize,
        pub loads: Cell<u32>,
        pub unreachable: Vec<Coordinate>,
    }

    impl StraightLineRoads {
        pub(crate) fn new(steps: usize) -> Self {
            Self {
                steps,
                loads: Cell::new(0),
                unreachable: Vec::new(),
            }
        }
    }

    impl RoadNetworkProvider for StraightLineRoads {
        type Network = NetworkType;

        fn load_network(
            &self,
            network_type: NetworkType,
            _region: &NetworkRegion,
        ) -> Result<NetworkType> {
            self.loads.set(self.loads.get() + 1);
            Ok(network_type)
        }

        fn shortest_path(
            &self,
            _network: &NetworkType,
            origin: Coordinate,
            destination: Coordinate,
        ) -> Result<Vec<Coordinate>> {
            if self.unreachable.contains(&destination) {
                return Ok(Vec::new());
            }
            Ok((0..=self.steps)
                .map(|i| {
                    let t = i as f64 / self.steps as f64;
                    Coordinate::new(
                        origin.latitude + t * (destination.latitude - origin.latitude),
                        origin.longitude + t * (destination.longitude - origin.longitude),
                    )
                })
                .collect())
        }
    }

    /// Transit planner answering every query with the same itineraries.
    pub(crate) struct CannedTransit {
        pub itineraries: Vec<Itinerary>,
        pub queries: RefCell<Vec<TransitQuery>>,
    }

    impl TransitProvider for CannedTransit {
        fn plan(&self, query: &TransitQuery) -> Result<Vec<Itinerary>> {
            self.queries.borrow_mut().push(query.clone());
            Ok(self.itineraries.clone())
        }
    }

    pub(crate) struct FailingTransit;

    impl TransitProvider for FailingTransit {
        fn plan(&self, _query: &TransitQuery) -> Result<Vec<Itinerary>> {
            Err(Error::ServiceStatus {
                service: "OpenTripPlanner".to_string(),
                status: 502,
                body: "bad gateway".to_string(),
            })
        }
    }

    pub(crate) fn walk_leg(points: &[(f64, f64)]) -> Leg {
        let line: LineString<f64> = points
            .iter()
            .map(|&(lat, lon)| Coord { x: lon, y: lat })
            .collect();
        Leg {
            mode: "WALK".to_string(),
            from: None,
            to: None,
            geometry: LegGeometry {
                length: None,
                points: polyline::encode_coordinates(line, 5).unwrap(),
            },
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-09 15:42", "%Y-%m-%d %H:%M").unwrap()
    }

    fn school() -> Location {
        Location::new("Schule", Coordinate::new(52.0, 13.0))
    }

    /// Candidates at ~111 m, ~1112 m and ~5560 m north of the school.
    fn candidates() -> Vec<Location> {
        vec![
            Location::new("near", Coordinate::new(52.001, 13.0)),
            Location::new("mid", Coordinate::new(52.01, 13.0)),
            Location::new("far", Coordinate::new(52.05, 13.0)),
        ]
    }

    fn no_transit() -> CannedTransit {
        CannedTransit {
            itineraries: vec![],
            queries: RefCell::new(vec![]),
        }
    }

    fn single_rule(rule: ModalityRule) -> RoutingModalityConfig {
        RoutingModalityConfig::new(vec![rule], 1).unwrap()
    }

    /// Route the default school and candidates with a fresh cache.
    fn run<T: TransitProvider>(
        config: &RoutingModalityConfig,
        roads: &StraightLineRoads,
        transit: &T,
    ) -> Result<RoutingOutcome> {
        compute_school_routes(
            &school(),
            &candidates(),
            config,
            roads,
            transit,
            &mut NetworkCache::new(),
            now(),
            &mut NoProgress,
        )
    }

    #[test]
    fn test_radius_ring_selects_candidates() {
        let config = single_rule(
            ModalityRule::new("walk", 0.0, Some(2000.0)).with_display_name("Zu Fuß"),
        );
        let roads = StraightLineRoads::new(2);

        let outcome = run(&config, &roads, &no_transit()).unwrap();

        assert_eq!(outcome.routes.len(), 3);
        assert_eq!(outcome.routes[0].points.len(), 3);
        assert_eq!(outcome.routes[1].points.len(), 3);
        assert!(outcome.routes[2].is_empty());
        assert!(outcome.routes.iter().all(|r| r.modality == "Zu Fuß"));
        assert_eq!(outcome.routes[0].points[0], Coordinate::new(52.0, 13.0));

        let report = &outcome.reports[0];
        assert_eq!(
            (report.routed, report.out_of_range, report.unreachable),
            (2, 1, 0)
        );
    }

    #[test]
    fn test_overlapping_rules_route_twice_and_share_network_cache() {
        let config = RoutingModalityConfig::new(
            vec![
                ModalityRule::new("walk", 0.0, None),
                ModalityRule::new("walk", 1000.0, None).with_display_name("walk far"),
                ModalityRule::new("bicycle", 0.0, None),
            ],
            1,
        )
        .unwrap();
        let roads = StraightLineRoads::new(1);
        let mut cache = NetworkCache::new();

        let outcome = compute_school_routes(
            &school(),
            &candidates(),
            &config,
            &roads,
            &no_transit(),
            &mut cache,
            now(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(outcome.routes.len(), 9);
        assert_eq!(outcome.reports[1].out_of_range, 1);
        // two walk rules share one walk network, bicycle loads its own
        assert_eq!(roads.loads.get(), 2);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_unknown_modality_is_skipped_with_warning() {
        let config = RoutingModalityConfig::new(
            vec![
                ModalityRule::new("hoverboard", 0.0, None),
                ModalityRule::new("walk", 0.0, None),
            ],
            1,
        )
        .unwrap();
        let roads = StraightLineRoads::new(1);

        let outcome = run(&config, &roads, &no_transit()).unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("hoverboard"));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.routes.len(), 3);
    }

    #[test]
    fn test_unreachable_is_empty_route_not_error() {
        let config = single_rule(ModalityRule::new("walk", 0.0, None));
        let mut roads = StraightLineRoads::new(1);
        roads.unreachable.push(Coordinate::new(52.01, 13.0));

        let outcome = run(&config, &roads, &no_transit()).unwrap();

        assert!(outcome.routes[1].is_empty());
        assert_eq!(outcome.reports[0].unreachable, 1);
    }

    #[test]
    fn test_no_network_load_when_nobody_in_range() {
        let config = single_rule(ModalityRule::new("walk", 0.0, Some(10.0)));
        let roads = StraightLineRoads::new(1);

        let outcome = run(&config, &roads, &no_transit()).unwrap();

        assert_eq!(roads.loads.get(), 0);
        assert!(outcome.routes.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_transit_uses_anchor_and_shortest_itinerary() {
        let slow = Itinerary {
            start: DateTime::parse_from_rfc3339("2024-05-06T07:00:00+02:00").unwrap(),
            end: DateTime::parse_from_rfc3339("2024-05-06T08:00:00+02:00").unwrap(),
            legs: vec![walk_leg(&[(52.0, 13.0), (52.0, 13.1)])],
        };
        let fast = Itinerary {
            start: DateTime::parse_from_rfc3339("2024-05-06T07:00:00+02:00").unwrap(),
            end: DateTime::parse_from_rfc3339("2024-05-06T07:20:00+02:00").unwrap(),
            legs: vec![walk_leg(&[(52.0, 13.0), (52.0005, 13.0), (52.001, 13.0)])],
        };
        let transit = CannedTransit {
            itineraries: vec![slow, fast],
            queries: RefCell::new(vec![]),
        };
        let config = single_rule(
            ModalityRule::new("public_transport_walking", 0.0, Some(500.0))
                .with_display_name("ÖPNV"),
        );
        let roads = StraightLineRoads::new(1);

        let outcome = run(&config, &roads, &transit).unwrap();

        // near candidate routed, mid + far out of range
        assert_eq!(outcome.routes.len(), 3);
        assert_eq!(
            outcome.routes[0].points,
            vec![
                Coordinate::new(52.0, 13.0),
                Coordinate::new(52.0005, 13.0),
                Coordinate::new(52.001, 13.0)
            ]
        );

        let queries = transit.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].date_string(), "2024-05-06");
        assert_eq!(queries[0].time_string(), "07:00");
        assert_eq!(queries[0].modes.len(), 8);
        assert_eq!(roads.loads.get(), 0);
    }

    #[test]
    fn test_transit_without_itineraries() {
        let config = single_rule(ModalityRule::new("public_transport_walking", 0.0, None));
        let outcome = run(&config, &StraightLineRoads::new(1), &no_transit()).unwrap();
        assert_eq!(outcome.routes.len(), 3);
        assert!(outcome.routes.iter().all(|r| r.is_empty()));
        assert_eq!(outcome.reports[0].unreachable, 3);
    }

    #[test]
    fn test_provider_failure_is_fatal() {
        let config = single_rule(ModalityRule::new("public_transport_walking", 0.0, None));
        let err = run(&config, &StraightLineRoads::new(1), &FailingTransit).unwrap_err();
        assert!(err.is_service_error());
    }

    #[test]
    fn test_main_location_without_coordinates() {
        let mut main = school();
        main.coordinate = None;
        let config = single_rule(ModalityRule::new("walk", 0.0, None));
        let err = compute_school_routes(
            &main,
            &candidates(),
            &config,
            &StraightLineRoads::new(1),
            &no_transit(),
            &mut NetworkCache::new(),
            now(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingCoordinates(_)));
    }

    #[test]
    fn test_progress_checkpoints() {
        let config = single_rule(ModalityRule::new("walk", 0.0, Some(2000.0)));
        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.clone());

        compute_school_routes(
            &school(),
            &candidates(),
            &config,
            &StraightLineRoads::new(1),
            &no_transit(),
            &mut NetworkCache::new(),
            now(),
            &mut sink,
        )
        .unwrap();

        let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::LoadingNetwork, Stage::Routing, Stage::Routing]
        );
        assert_eq!(events[2].current, 2);
        assert_eq!(events[2].total, 3);
    }
}
