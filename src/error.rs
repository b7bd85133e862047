//! Error taxonomy for schema loading, page fetching, extraction and normalization

use std::time::Duration;

use thiserror::Error;

/// An invalid extraction schema. Raised while a schema is built or loaded,
/// before any page is fetched.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("field at `{path}` has an empty name")]
    EmptyName { path: String },

    #[error("duplicate field name `{name}` under `{path}`")]
    DuplicateField { path: String, name: String },

    #[error("attribute field `{path}` does not name an attribute")]
    MissingAttribute { path: String },

    #[error("field `{path}` names an attribute but is not an attribute field")]
    UnexpectedAttribute { path: String },

    #[error("field `{path}` needs at least one subfield")]
    MissingSubfields { path: String },

    #[error("field `{path}` cannot have subfields")]
    UnexpectedSubfields { path: String },

    #[error("list field `{path}` takes at most one subfield, got {count}")]
    TooManyListSubfields { path: String, count: usize },

    #[error("list subfield under `{path}` must produce a scalar value")]
    NonScalarListSubfield { path: String },

    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A page could not be obtained from the renderer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} was not ready within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. } | Self::Status { url, .. } | Self::Timeout { url, .. } => url,
        }
    }
}

/// The rendered document cannot be traversed at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("rendered document for {url} is empty")]
    EmptyDocument { url: String },
}

/// Failure of a single extraction job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("job for {url} was cancelled")]
    Cancelled { url: String },

    #[error("job for {url} ended without a result: {message}")]
    Interrupted { url: String, message: String },
}

impl JobError {
    pub fn url(&self) -> &str {
        match self {
            Self::Fetch(e) => e.url(),
            Self::Extraction(ExtractionError::EmptyDocument { url })
            | Self::Cancelled { url }
            | Self::Interrupted { url, .. } => url,
        }
    }
}

/// A single raw record could not be turned into a domain record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("{item}: unrecognized price range `{value}`")]
    UnknownPriceRange { item: String, value: String },

    #[error("{item}: rating `{value}` is not a number")]
    InvalidRating { item: String, value: String },

    #[error("{item}: rating {value} is outside [0, 5]")]
    RatingOutOfRange { item: String, value: f32 },

    #[error("{item}: required field `{field}` is missing")]
    MissingField { item: String, field: &'static str },
}

impl NormalizationError {
    pub fn item(&self) -> &str {
        match self {
            Self::UnknownPriceRange { item, .. }
            | Self::InvalidRating { item, .. }
            | Self::RatingOutOfRange { item, .. }
            | Self::MissingField { item, .. } => item,
        }
    }
}

/// A configuration value could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse `{value}` ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
