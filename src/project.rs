//! Projects and the store contract.
//!
//! A project exclusively owns its main location and its segments. Segments
//! are derived once when the project is created and never edited; deleting a
//! project deletes them with it.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geocoding::Location;
use crate::segments::{collapse_duplicates, Segment};

/// A project that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
    pub main_location: Location,
    pub segments: Vec<Segment>,
}

/// A stored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
    /// Carries the id assigned by the store
    pub main_location: Location,
    pub segments: Vec<Segment>,
}

impl Project {
    /// The project name, or `Project {id}` when unnamed.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Project {}", self.id),
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            segment_count: self.segments.len(),
        }
    }
}

/// Listing entry of a stored project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
    pub segment_count: usize,
}

/// Storage for projects.
pub trait ProjectStore {
    /// Store a project and return its id.
    ///
    /// Segments sharing (start, end, modality) are stored once with their
    /// frequencies summed.
    fn create(&mut self, project: NewProject) -> Result<i64>;

    fn get(&self, id: i64) -> Result<Option<Project>>;

    /// Delete a project and its segments. Fails with
    /// [`Error::ProjectNotFound`] for an unknown id.
    fn delete(&mut self, id: i64) -> Result<()>;

    /// All stored projects, ordered by id.
    fn list(&self) -> Result<Vec<ProjectSummary>>;
}

/// Process-local project store.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: BTreeMap<i64, Project>,
    next_project_id: i64,
    next_location_id: i64,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn create(&mut self, project: NewProject) -> Result<i64> {
        self.next_project_id += 1;
        self.next_location_id += 1;
        let id = self.next_project_id;

        let mut main_location = project.main_location;
        main_location.id = Some(self.next_location_id);
        let segments = collapse_duplicates(project.segments);

        debug!("[ProjectStore] Creating project {} with {} segments", id, segments.len());
        self.projects.insert(
            id,
            Project {
                id,
                name: project.name,
                created_at: project.created_at,
                main_location,
                segments,
            },
        );
        Ok(id)
    }

    fn get(&self, id: i64) -> Result<Option<Project>> {
        Ok(self.projects.get(&id).cloned())
    }

    fn delete(&mut self, id: i64) -> Result<()> {
        self.projects
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::ProjectNotFound(id))
    }

    fn list(&self) -> Result<Vec<ProjectSummary>> {
        Ok(self.projects.values().map(Project::summary).collect())
    }
}
