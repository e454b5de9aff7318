//! SQLite project store.
//!
//! Schema:
//! - `locations`: main locations, address metadata as a JSON column
//! - `projects`: name, creation time, main location reference
//! - `segments`: rows of a project, removed with it via `ON DELETE CASCADE`

use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::ServiceEndpoints;
use crate::error::{Error, Result};
use crate::geocoding::{Location, LocationDetails};
use crate::project::{NewProject, Project, ProjectStore, ProjectSummary};
use crate::segments::{collapse_duplicates, Segment};
use crate::Coordinate;

/// [`ProjectStore`] backed by a SQLite database.
pub struct SqliteProjectStore {
    conn: Connection,
}

impl SqliteProjectStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("[SqliteProjectStore] Opening {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Open the database named by `SQL_DATABASE_URL`.
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self> {
        let path = endpoints.sqlite_path().ok_or_else(|| {
            Error::Config(format!("Not a SQLite database URL: {}", endpoints.database_url))
        })?;
        Self::open(path)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                lat REAL,
                lon REAL,
                details TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                created_at TEXT NOT NULL,
                main_location_id INTEGER REFERENCES locations(id)
            );

            CREATE TABLE IF NOT EXISTS segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                lat_from REAL NOT NULL,
                lon_from REAL NOT NULL,
                lat_to REAL NOT NULL,
                lon_to REAL NOT NULL,
                modality TEXT NOT NULL,
                frequency INTEGER NOT NULL,
                UNIQUE (project_id, lat_from, lon_from, lat_to, lon_to, modality)
            );

            CREATE INDEX IF NOT EXISTS idx_segments_project ON segments(project_id);
        "#,
        )?;
        Ok(())
    }

    fn load_location(&self, id: i64) -> Result<Option<Location>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, lat, lon, details FROM locations WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, lat, lon, details)) = row else {
            return Ok(None);
        };
        let details: LocationDetails = serde_json::from_str(&details)?;
        Ok(Some(Location {
            id: Some(id),
            name,
            coordinate: lat.zip(lon).map(|(lat, lon)| Coordinate::new(lat, lon)),
            details,
        }))
    }

    fn load_segments(&self, project_id: i64) -> Result<Vec<Segment>> {
        let mut stmt = self.conn.prepare(
            "SELECT lat_from, lon_from, lat_to, lon_to, modality, frequency
             FROM segments WHERE project_id = ? ORDER BY id",
        )?;
        let segments = stmt
            .query_map(params![project_id], |row| {
                Ok(Segment {
                    start: Coordinate::new(row.get(0)?, row.get(1)?),
                    end: Coordinate::new(row.get(2)?, row.get(3)?),
                    modality: row.get(4)?,
                    frequency: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(segments)
    }
}

impl ProjectStore for SqliteProjectStore {
    fn create(&mut self, project: NewProject) -> Result<i64> {
        let details = serde_json::to_string(&project.main_location.details)?;
        let segments = collapse_duplicates(project.segments);
        let tx = self.conn.transaction()?;

        let location = &project.main_location;
        tx.execute(
            "INSERT INTO locations (name, lat, lon, details) VALUES (?, ?, ?, ?)",
            params![
                location.name,
                location.coordinate.map(|c| c.latitude),
                location.coordinate.map(|c| c.longitude),
                details,
            ],
        )?;
        let location_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO projects (name, created_at, main_location_id) VALUES (?, ?, ?)",
            params![project.name, project.created_at, location_id],
        )?;
        let project_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO segments
                 (project_id, lat_from, lon_from, lat_to, lon_to, modality, frequency)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for s in &segments {
                stmt.execute(params![
                    project_id,
                    s.start.latitude,
                    s.start.longitude,
                    s.end.latitude,
                    s.end.longitude,
                    s.modality,
                    s.frequency,
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "[SqliteProjectStore] Created project {} with {} segments",
            project_id,
            segments.len()
        );
        Ok(project_id)
    }

    fn get(&self, id: i64) -> Result<Option<Project>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, created_at, main_location_id FROM projects WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, NaiveDateTime>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, created_at, location_id)) = row else {
            return Ok(None);
        };

        let main_location = match location_id {
            Some(location_id) => self.load_location(location_id)?,
            None => None,
        }
        .ok_or_else(|| Error::InvalidData(format!("Project {} has no main location", id)))?;

        Ok(Some(Project {
            id,
            name,
            created_at,
            main_location,
            segments: self.load_segments(id)?,
        }))
    }

    fn delete(&mut self, id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let location_id: Option<i64> = tx
            .query_row(
                "SELECT main_location_id FROM projects WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(Error::ProjectNotFound(id))?;

        tx.execute("DELETE FROM projects WHERE id = ?", params![id])?;
        if let Some(location_id) = location_id {
            tx.execute("DELETE FROM locations WHERE id = ?", params![location_id])?;
        }
        tx.commit()?;

        debug!("[SqliteProjectStore] Deleted project {}", id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<ProjectSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.created_at, COUNT(s.id)
             FROM projects p LEFT JOIN segments s ON s.project_id = p.id
             GROUP BY p.id ORDER BY p.id",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(ProjectSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    segment_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }
}
