//! Public transport itineraries and their walking sub-legs.
//!
//! The transit modality only counts the walking parts of a trip: from the
//! school to the first stop, between interchanges, and from the last stop to
//! the student's address. Queries are pinned to Monday 07:00 of the current
//! week so repeated runs within a week see the same timetable.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{Coordinate, Route};

/// Hour of the weekly reference departure.
pub const ANCHOR_HOUR: i64 = 7;

/// Precision of the encoded leg geometries (Google polyline, 5 digits).
const POLYLINE_PRECISION: u32 = 5;

/// Normalize `now` to Monday of the same week at 07:00.
pub fn anchor_reference_time(now: NaiveDateTime) -> NaiveDateTime {
    let days_since_monday = now.weekday().num_days_from_monday() as i64;
    let monday = now.date() - Duration::days(days_since_monday);
    monday.and_time(NaiveTime::MIN) + Duration::hours(ANCHOR_HOUR)
}

/// A trip planning request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitQuery {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Planner mode names, e.g. `BUS`, `WALK`
    pub modes: Vec<String>,
}

impl TransitQuery {
    /// Query departing at the weekly anchor derived from `now`.
    pub fn anchored(
        origin: Coordinate,
        destination: Coordinate,
        now: NaiveDateTime,
        modes: Vec<String>,
    ) -> Self {
        let anchor = anchor_reference_time(now);
        Self {
            origin,
            destination,
            date: anchor.date(),
            time: anchor.time(),
            modes,
        }
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// `HH:MM`
    pub fn time_string(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

/// Named stop or place at either end of a leg.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegPlace {
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// Encoded geometry of a leg.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegGeometry {
    pub length: Option<u32>,
    /// Google encoded polyline
    pub points: String,
}

/// One leg of an itinerary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Leg {
    pub mode: String,
    #[serde(default)]
    pub from: Option<LegPlace>,
    #[serde(default)]
    pub to: Option<LegPlace>,
    #[serde(rename = "legGeometry")]
    pub geometry: LegGeometry,
}

impl Leg {
    pub fn is_walk(&self) -> bool {
        self.mode.eq_ignore_ascii_case("WALK")
    }

    /// Decode the leg geometry into coordinates.
    pub fn points(&self) -> Result<Vec<Coordinate>> {
        let line = polyline::decode_polyline(&self.geometry.points, POLYLINE_PRECISION)
            .map_err(|e| {
                Error::InvalidData(format!("Undecodable {} leg geometry: {}", self.mode, e))
            })?;
        Ok(line.coords().map(|c| Coordinate::new(c.y, c.x)).collect())
    }
}

/// A complete trip plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Itinerary {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub legs: Vec<Leg>,
}

impl Itinerary {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// The itinerary with the smallest `end - start`; the first one on ties.
pub fn shortest_itinerary(itineraries: &[Itinerary]) -> Option<&Itinerary> {
    itineraries.iter().min_by_key(|it| it.duration())
}

/// Split an itinerary into its walking sub-routes.
///
/// Walking legs accumulate into the current route; any other leg closes it
/// (if non-empty) and starts a new one. Each leg drops its final point, which
/// is the first point of the following leg. `destination` is always appended
/// as the last point of the final walking route.
pub fn walking_routes(
    itinerary: &Itinerary,
    destination: Coordinate,
    label: &str,
) -> Result<Vec<Route>> {
    let mut routes = Vec::new();
    let mut current: Vec<Coordinate> = Vec::new();

    for leg in &itinerary.legs {
        if leg.is_walk() {
            let mut points = leg.points()?;
            points.pop();
            current.extend(points);
        } else if !current.is_empty() {
            routes.push(Route::new(label, std::mem::take(&mut current)));
        }
    }

    current.push(destination);
    routes.push(Route::new(label, current));

    debug!(
        "[Transit] {} legs -> {} walking routes ({:?} trip)",
        itinerary.legs.len(),
        routes.len(),
        itinerary.duration()
    );

    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use geo::{Coord, LineString};

    fn encode(points: &[(f64, f64)]) -> String {
        let line: LineString<f64> = points
            .iter()
            .map(|&(lat, lon)| Coord { x: lon, y: lat })
            .collect();
        polyline::encode_coordinates(line, 5).unwrap()
    }

    fn leg(mode: &str, points: &[(f64, f64)]) -> Leg {
        Leg {
            mode: mode.to_string(),
            from: None,
            to: None,
            geometry: LegGeometry {
                length: Some(points.len() as u32),
                points: encode(points),
            },
        }
    }

    fn itinerary(start: &str, end: &str, legs: Vec<Leg>) -> Itinerary {
        Itinerary {
            start: DateTime::parse_from_rfc3339(start).unwrap(),
            end: DateTime::parse_from_rfc3339(end).unwrap(),
            legs,
        }
    }

    fn datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_anchor_reference_time() {
        // Thursday afternoon -> Monday 07:00 of the same week
        let anchored = anchor_reference_time(datetime("2024-05-09 15:42"));
        assert_eq!(anchored, datetime("2024-05-06 07:00"));
        assert_eq!(anchored.weekday(), Weekday::Mon);

        // Monday before 07:00 stays on that Monday
        assert_eq!(
            anchor_reference_time(datetime("2024-05-06 05:10")),
            datetime("2024-05-06 07:00")
        );

        // Sunday belongs to the week that started the previous Monday
        assert_eq!(
            anchor_reference_time(datetime("2024-05-12 23:59")),
            datetime("2024-05-06 07:00")
        );
    }

    #[test]
    fn test_query_strings() {
        let query = TransitQuery::anchored(
            Coordinate::new(52.0, 13.0),
            Coordinate::new(52.1, 13.1),
            datetime("2024-05-09 15:42"),
            vec!["BUS".to_string()],
        );
        assert_eq!(query.date_string(), "2024-05-06");
        assert_eq!(query.time_string(), "07:00");
    }

    #[test]
    fn test_shortest_itinerary_first_on_tie() {
        let a = itinerary("2024-05-06T07:00:00+02:00", "2024-05-06T07:30:00+02:00", vec![]);
        let b = itinerary("2024-05-06T07:05:00+02:00", "2024-05-06T07:25:00+02:00", vec![]);
        let c = itinerary("2024-05-06T07:10:00+02:00", "2024-05-06T07:30:00+02:00", vec![]);
        let all = [a, b.clone(), c];

        assert_eq!(shortest_itinerary(&all), Some(&b));
        assert_eq!(shortest_itinerary(&[]), None);
    }

    #[test]
    fn test_leg_decoding() {
        let l = leg("WALK", &[(52.0, 13.0), (52.001, 13.002)]);
        let points = l.points().unwrap();
        assert_eq!(points, vec![Coordinate::new(52.0, 13.0), Coordinate::new(52.001, 13.002)]);
        assert!(l.is_walk());
        assert!(!leg("BUS", &[]).is_walk());
    }

    #[test]
    fn test_walking_routes_split_at_transit_legs() {
        let plan = itinerary(
            "2024-05-06T07:00:00+02:00",
            "2024-05-06T07:40:00+02:00",
            vec![
                leg("WALK", &[(52.0, 13.0), (52.001, 13.0), (52.002, 13.0)]),
                leg("BUS", &[(52.002, 13.0), (52.05, 13.0)]),
                leg("WALK", &[(52.05, 13.0), (52.051, 13.0), (52.052, 13.0)]),
                leg("TRAM", &[(52.052, 13.0), (52.09, 13.0)]),
                leg("WALK", &[(52.09, 13.0), (52.0995, 13.0)]),
            ],
        );
        let destination = Coordinate::new(52.1, 13.0);
        let routes = walking_routes(&plan, destination, "ÖPNV").unwrap();

        assert_eq!(routes.len(), 3);
        assert_eq!(
            routes[0].points,
            vec![Coordinate::new(52.0, 13.0), Coordinate::new(52.001, 13.0)]
        );
        assert_eq!(
            routes[1].points,
            vec![Coordinate::new(52.05, 13.0), Coordinate::new(52.051, 13.0)]
        );
        assert_eq!(routes[2].points, vec![Coordinate::new(52.09, 13.0), destination]);
        assert!(routes.iter().all(|r| r.modality == "ÖPNV"));
    }

    #[test]
    fn test_walking_routes_transit_only_end() {
        // Trip ending on a transit leg: the destination forms its own route
        let plan = itinerary(
            "2024-05-06T07:00:00+02:00",
            "2024-05-06T07:20:00+02:00",
            vec![leg("RAIL", &[(52.0, 13.0), (52.1, 13.0)])],
        );
        let destination = Coordinate::new(52.1, 13.0);
        let routes = walking_routes(&plan, destination, "transit").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].points, vec![destination]);
    }

    #[test]
    fn test_deserialize_otp_itinerary() {
        let json = format!(
            r#"{{
                "start": "2024-05-06T07:02:00+02:00",
                "end": "2024-05-06T07:31:00+02:00",
                "legs": [
                    {{"mode": "WALK", "from": {{"name": "Origin", "lat": 52.0, "lon": 13.0}},
                      "to": {{"name": "Stop A", "lat": 52.001, "lon": 13.0}},
                      "legGeometry": {{"length": 2, "points": "{}"}}}}
                ]
            }}"#,
            encode(&[(52.0, 13.0), (52.001, 13.0)])
        );
        let parsed: Itinerary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.duration(), Duration::minutes(29));
        assert_eq!(parsed.legs[0].to.as_ref().and_then(|p| p.name.as_deref()), Some("Stop A"));
        assert_eq!(parsed.legs[0].points().unwrap().len(), 2);
    }
}
