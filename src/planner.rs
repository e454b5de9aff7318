//! End-to-end project creation.
//!
//! [`SchoolRoutePlanner`] owns the collaborators of a run and the road network
//! cache shared by all of its shortest-path queries. Creating a project runs
//! geocoding, routing, aggregation and persistence in that order, reporting
//! progress at each checkpoint.

use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::config::RoutingModalityConfig;
use crate::error::{Error, Result};
use crate::geocoding::{geocode_batch, Location};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::project::{NewProject, Project, ProjectStore};
use crate::providers::{Geocoder, NetworkCache, RoadNetworkProvider, TransitProvider};
use crate::routing::{compute_school_routes, ModalityReport, RoutingOutcome};
use crate::segments::SegmentCounter;

/// Input of a project creation run.
#[derive(Debug, Clone)]
pub struct ProjectRequest {
    /// The school, already geocoded
    pub main_location: Location,
    /// Defaults to the main location's label
    pub name: Option<String>,
    /// Free-text student addresses
    pub addresses: Vec<String>,
    /// Create the project even if some addresses could not be geocoded
    pub force: bool,
}

/// A stored project plus what the routing run reported.
#[derive(Debug, Clone)]
pub struct CreatedProject {
    pub project: Project,
    pub warnings: Vec<String>,
    pub reports: Vec<ModalityReport>,
    /// Addresses skipped because they could not be geocoded
    pub unresolved: Vec<String>,
}

/// Geocoder, routing providers, configuration and network cache of a run.
pub struct SchoolRoutePlanner<G, R, T>
where
    R: RoadNetworkProvider,
{
    geocoder: G,
    road: R,
    transit: T,
    config: RoutingModalityConfig,
    cache: NetworkCache<R::Network>,
}

impl<G, R, T> SchoolRoutePlanner<G, R, T>
where
    G: Geocoder,
    R: RoadNetworkProvider,
    T: TransitProvider,
{
    pub fn new(geocoder: G, road: R, transit: T, config: RoutingModalityConfig) -> Self {
        Self {
            geocoder,
            road,
            transit,
            config,
            cache: NetworkCache::new(),
        }
    }

    pub fn config(&self) -> &RoutingModalityConfig {
        &self.config
    }

    pub fn cache(&self) -> &NetworkCache<R::Network> {
        &self.cache
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Route already geocoded candidates from the main location.
    pub fn plan_routes(
        &mut self,
        main: &Location,
        candidates: &[Location],
        now: NaiveDateTime,
        progress: &mut dyn ProgressSink,
    ) -> Result<RoutingOutcome> {
        compute_school_routes(
            main,
            candidates,
            &self.config,
            &self.road,
            &self.transit,
            &mut self.cache,
            now,
            progress,
        )
    }

    /// Create and store a project, anchoring transit queries at the current
    /// local time.
    pub fn create_project<S>(
        &mut self,
        request: ProjectRequest,
        store: &mut S,
        progress: &mut dyn ProgressSink,
    ) -> Result<CreatedProject>
    where
        S: ProjectStore + ?Sized,
    {
        self.create_project_at(request, store, Local::now().naive_local(), progress)
    }

    /// Create and store a project as of `now`.
    ///
    /// Nothing is stored if any address fails to geocode, unless
    /// `request.force` is set; unresolved addresses are then skipped.
    pub fn create_project_at<S>(
        &mut self,
        request: ProjectRequest,
        store: &mut S,
        now: NaiveDateTime,
        progress: &mut dyn ProgressSink,
    ) -> Result<CreatedProject>
    where
        S: ProjectStore + ?Sized,
    {
        let main = request.main_location;
        if !main.is_routable() {
            return Err(Error::MissingCoordinates(main.label()));
        }

        let geocoded = geocode_batch(&self.geocoder, &request.addresses, progress)?;

        let mut candidates = Vec::with_capacity(geocoded.len());
        let mut unresolved = Vec::new();
        for (address, location) in request.addresses.iter().zip(geocoded) {
            match location {
                Some(loc) if loc.is_routable() => candidates.push(loc),
                _ => unresolved.push(address.clone()),
            }
        }

        if !unresolved.is_empty() {
            if !request.force {
                return Err(Error::UnresolvedAddresses {
                    failed: unresolved,
                    total: request.addresses.len(),
                });
            }
            warn!(
                "[Planner] Ignoring {} of {} unresolved addresses",
                unresolved.len(),
                request.addresses.len()
            );
        }

        let outcome = self.plan_routes(&main, &candidates, now, progress)?;

        let total = outcome.routes.len();
        let mut counter = SegmentCounter::new();
        for (i, route) in outcome.routes.iter().enumerate() {
            progress.report(&ProgressEvent::new(
                Stage::Aggregating,
                i + 1,
                total,
                route.modality.as_str(),
            ));
            counter.add_route(route);
        }
        let segments = counter.finish(self.config.min_segment_frequency);

        let name = request.name.filter(|n| !n.is_empty()).unwrap_or_else(|| main.label());
        progress.report(&ProgressEvent::new(Stage::Persisting, 0, 0, name.as_str()));

        let id = store.create(NewProject {
            name: Some(name),
            created_at: now,
            main_location: main,
            segments,
        })?;
        let project = store.get(id)?.ok_or(Error::ProjectNotFound(id))?;

        info!(
            "[Planner] Created project {} '{}' with {} segments from {} routes",
            project.id,
            project.display_name(),
            project.segments.len(),
            total
        );
        progress.report(&ProgressEvent::new(Stage::Done, 0, 0, project.display_name()));

        Ok(CreatedProject {
            project,
            warnings: outcome.warnings,
            reports: outcome.reports,
            unresolved,
        })
    }
}
