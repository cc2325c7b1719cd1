// src/error.rs

//! Crate-wide error type
//!
//! Entry-level build failures are values of this type; the orchestrator
//! records them against the manifest entry and keeps going. Nothing here is
//! meant to abort a whole build pass.

use thiserror::Error;

/// Errors produced while resolving, fetching and assembling packages
#[derive(Error, Debug)]
pub enum Error {
    /// A version, range or framework moniker could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The registry manifest is malformed or inconsistent
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// The upstream source failed to deliver metadata or content
    #[error("Failed to fetch {package}: {reason}")]
    FetchFailure { package: String, reason: String },

    /// No version or file group satisfies the entry's constraints
    #[error("Resolution failed for {package}: {reason}")]
    ResolutionFailure { package: String, reason: String },

    /// Package content could not be decoded
    #[error("Failed to decode {path}: {reason}")]
    DecodeFailure { path: String, reason: String },

    /// A requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    pub fn fetch(package: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailure {
            package: package.into(),
            reason: reason.to_string(),
        }
    }

    pub fn resolution(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResolutionFailure {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Short classification used in build reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "parse",
            Self::InvalidManifest(_) => "manifest",
            Self::FetchFailure { .. } => "fetch",
            Self::ResolutionFailure { .. } => "resolution",
            Self::DecodeFailure { .. } => "decode",
            Self::NotFound(_) => "not-found",
            Self::IoError(_) => "io",
            Self::JsonError(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
