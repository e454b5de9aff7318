//! Address list import and project export.
//!
//! Exported archives contain:
//! - `segments.csv`: one row per segment
//! - `project_metadata.json`: id, name, creation time and main location

use std::io::{Read, Seek, Write};

use log::debug;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::project::Project;

pub const SEGMENTS_FILE: &str = "segments.csv";
pub const METADATA_FILE: &str = "project_metadata.json";

const SEGMENT_COLUMNS: [&str; 7] = [
    "id",
    "lat_from",
    "lon_from",
    "lat_to",
    "lon_to",
    "modality",
    "frequency",
];

/// Read a CSV address table and join the selected columns of each row, in
/// the given order, with a single space.
pub fn read_address_list<R: Read>(reader: R, columns: &[&str]) -> Result<Vec<String>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let indices = columns
        .iter()
        .map(|col| {
            headers
                .iter()
                .position(|h| h == *col)
                .ok_or_else(|| Error::Config(format!("Unknown address column '{}'", col)))
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut addresses = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let parts: Vec<&str> = indices.iter().map(|&i| record.get(i).unwrap_or("")).collect();
        addresses.push(parts.join(" "));
    }

    debug!("[Export] Read {} addresses from columns {:?}", addresses.len(), columns);
    Ok(addresses)
}

#[derive(Serialize)]
struct SegmentRow<'a> {
    id: usize,
    lat_from: f64,
    lon_from: f64,
    lat_to: f64,
    lon_to: f64,
    modality: &'a str,
    frequency: u32,
}

/// Write the project's segments as CSV. `id` is the 1-based position of the
/// segment within the project.
pub fn write_segments_csv<W: Write>(project: &Project, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if project.segments.is_empty() {
        csv_writer.write_record(SEGMENT_COLUMNS)?;
    }
    for (i, s) in project.segments.iter().enumerate() {
        csv_writer.serialize(SegmentRow {
            id: i + 1,
            lat_from: s.start.latitude,
            lon_from: s.start.longitude,
            lat_to: s.end.latitude,
            lon_to: s.end.longitude,
            modality: &s.modality,
            frequency: s.frequency,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Main location part of [`ProjectMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataLocation {
    pub id: Option<i64>,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Project metadata record of an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMetadata {
    pub id: i64,
    pub name: Option<String>,
    /// ISO-8601
    pub created_at: String,
    pub main_location: MetadataLocation,
}

impl ProjectMetadata {
    pub fn from_project(project: &Project) -> Self {
        let location = &project.main_location;
        Self {
            id: project.id,
            name: project.name.clone(),
            created_at: project.created_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            main_location: MetadataLocation {
                id: location.id,
                name: location.name.clone(),
                lat: location.coordinate.map(|c| c.latitude),
                lon: location.coordinate.map(|c| c.longitude),
            },
        }
    }

    /// JSON with 4-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buf).map_err(|e| Error::InvalidData(e.to_string()))
    }
}

/// Write a ZIP archive with the segment CSV and the project metadata.
///
/// Returns the underlying writer once the archive is finished.
pub fn write_project_archive<W: Write + Seek>(project: &Project, writer: W) -> Result<W> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);

    zip.start_file(SEGMENTS_FILE, options)?;
    write_segments_csv(project, &mut zip)?;

    zip.start_file(METADATA_FILE, options)?;
    zip.write_all(ProjectMetadata::from_project(project).to_json_pretty()?.as_bytes())?;

    let writer = zip.finish()?;
    debug!(
        "[Export] Wrote archive for project {} ({} segments)",
        project.id,
        project.segments.len()
    );
    Ok(writer)
}
