//! HTTP adapters for the geocoding and transit planning services.
//!
//! - [`NominatimGeocoder`]: `GET /search` on a Nominatim instance
//! - [`OtpTransitProvider`]: `plan` query against the OpenTripPlanner GTFS
//!   GraphQL endpoint
//!
//! Both adapters own a small tokio runtime and block on each request, so the
//! routing policy stays sequential: one request per candidate, in input order.
//! Requests are not retried; a failure aborts the run.

use std::time::{Duration, Instant};

use log::{debug, info};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::{Builder, Runtime};

use crate::config::ServiceEndpoints;
use crate::error::{Error, Result};
use crate::geocoding::{Location, NominatimPlace};
use crate::providers::{Geocoder, TransitProvider};
use crate::transit::{Itinerary, TransitQuery};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = concat!("school-routes/", env!("CARGO_PKG_VERSION"));

/// reqwest client plus the runtime that drives it.
struct BlockingClient {
    client: Client,
    runtime: Runtime,
}

impl BlockingClient {
    fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self { client, runtime })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.runtime.block_on(async {
            let resp = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| Error::Network(format!("{}: {}", service, e)))?;
            read_json(service, resp).await
        })
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        self.runtime.block_on(async {
            let resp = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| Error::Network(format!("{}: {}", service, e)))?;
            read_json(service, resp).await
        })
    }
}

async fn read_json<T: DeserializeOwned>(service: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::ServiceStatus {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("{}: body download error: {}", service, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidData(format!("{}: JSON parse error: {}", service, e)))
}

// =============================================================================
// Nominatim
// =============================================================================

/// Geocoder backed by a Nominatim instance.
pub struct NominatimGeocoder {
    base_url: String,
    http: BlockingClient,
}

impl NominatimGeocoder {
    /// `base_url` without trailing path, e.g. `http://localhost:8080`.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: BlockingClient::new()?,
        })
    }

    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
        Self::new(&endpoints.nominatim_url)
    }
}

fn search_params(text: &str, limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("q", text.to_string()),
        ("format", "json".to_string()),
        ("addressdetails", "1".to_string()),
        ("extratags", "1".to_string()),
        ("limit", limit.to_string()),
    ]
}

impl Geocoder for NominatimGeocoder {
    fn search(&self, text: &str, limit: usize) -> Result<Vec<Location>> {
        let url = format!("{}/search", self.base_url);
        let start = Instant::now();
        let places: Vec<NominatimPlace> =
            self.http.get_json("Nominatim", &url, &search_params(text, limit))?;

        debug!("[Nominatim] '{}' -> {} results in {:?}", text, places.len(), start.elapsed());
        Ok(places.into_iter().map(Location::from).collect())
    }
}

// =============================================================================
// OpenTripPlanner
// =============================================================================

#[derive(Debug, Deserialize)]
struct OtpResponse {
    data: Option<OtpData>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct OtpData {
    plan: Option<OtpPlan>,
}

#[derive(Debug, Deserialize)]
struct OtpPlan {
    #[serde(default)]
    itineraries: Vec<Itinerary>,
}

/// Transit planner backed by the OpenTripPlanner GTFS GraphQL API.
pub struct OtpTransitProvider {
    url: String,
    http: BlockingClient,
}

impl OtpTransitProvider {
    /// GraphQL endpoint, e.g. `http://localhost:9080/otp/gtfs/v1`.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            http: BlockingClient::new()?,
        })
    }

    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
        Self::new(&endpoints.otp_url)
    }
}

/// GraphQL `plan` query for `query`.
fn plan_query(query: &TransitQuery) -> String {
    let modes = query
        .modes
        .iter()
        .map(|m| format!("{{mode: {}}}", m))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{{
    plan(
        from: {{ lat: {}, lon: {} }}
        to: {{ lat: {}, lon: {} }}
        date: "{}"
        time: "{}"
        transportModes: [{}]
    ) {{
        itineraries {{
            start
            end
            legs {{
                mode
                from {{ name lat lon }}
                to {{ name lat lon }}
                legGeometry {{ length points }}
            }}
        }}
    }}
}}"#,
        query.origin.latitude,
        query.origin.longitude,
        query.destination.latitude,
        query.destination.longitude,
        query.date_string(),
        query.time_string(),
        modes
    )
}

fn itineraries_from(response: OtpResponse) -> Result<Vec<Itinerary>> {
    match response.data.and_then(|d| d.plan) {
        Some(plan) => Ok(plan.itineraries),
        None => Err(Error::InvalidData(format!(
            "OpenTripPlanner returned no plan: {:?}",
            response.errors.unwrap_or_default()
        ))),
    }
}

impl TransitProvider for OtpTransitProvider {
    fn plan(&self, query: &TransitQuery) -> Result<Vec<Itinerary>> {
        let start = Instant::now();
        let body = json!({ "query": plan_query(query) });
        let response: OtpResponse = self.http.post_json("OpenTripPlanner", &self.url, &body)?;
        let itineraries = itineraries_from(response)?;

        info!(
            "[OpenTripPlanner] {} {} -> {} itineraries in {:?}",
            query.date_string(),
            query.time_string(),
            itineraries.len(),
            start.elapsed()
        );
        Ok(itineraries)
    }
}
