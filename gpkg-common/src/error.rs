// gpkg-common/src/error.rs
use std::io;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GpkgError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("System Call Error: {0}")]
    Nix(#[from] nix::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Not Found: {0}")]
    NotExist(String),

    #[error("Already Exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid Arguments: {0}")]
    InvalidArgs(String),

    #[error("Authentication Required: {0}")]
    AuthRequired(String),

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Cannot download {component} version {version:?}: HTTP {status}")]
    HttpStatus {
        component: String,
        version: String,
        status: u16,
    },

    #[error("Archive Integrity Violation: {0}")]
    IntegrityViolation(String),

    #[error("Remote Command Failed on {host}: {message}")]
    Command { host: String, message: String },

    #[error("Failed to stop {0}")]
    StopFailed(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl GpkgError {
    /// True for "nothing there" conditions, including io `NotFound`.
    /// Fan-out loops swallow these and carry on with the next target.
    pub fn is_not_exist(&self) -> bool {
        match self {
            GpkgError::NotExist(_) => true,
            GpkgError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        match self {
            GpkgError::AlreadyExists(_) => true,
            GpkgError::Io(e) => e.kind() == io::ErrorKind::AlreadyExists,
            _ => false,
        }
    }
}

impl From<std::io::Error> for GpkgError {
    fn from(err: std::io::Error) -> Self {
        GpkgError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for GpkgError {
    fn from(err: reqwest::Error) -> Self {
        GpkgError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for GpkgError {
    fn from(err: serde_json::Error) -> Self {
        GpkgError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for GpkgError {
    fn from(err: semver::Error) -> Self {
        GpkgError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;
