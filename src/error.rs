use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No routing configuration found in model config")]
    MissingRouting,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{} of {total} addresses could not be geocoded", failed.len())]
    UnresolvedAddresses { failed: Vec<String>, total: usize },
    #[error("Location '{0}' has no coordinates")]
    MissingCoordinates(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{service} answered with status {status}: {body}")]
    ServiceStatus {
        service: String,
        status: u16,
        body: String,
    },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Project {0} not found")]
    ProjectNotFound(i64),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[cfg(feature = "persistence")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// True for failures talking to an external routing or geocoding service.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Error::Network(_) | Error::ServiceStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
