use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::Carrier;

#[derive(Error, Debug)]
pub enum ShipTrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Carrier error: {0}")]
    Carrier(#[from] CarrierError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Unknown carrier '{0}'")]
    UnknownCarrier(String),

    #[error("Shipment {0} not found")]
    ShipmentNotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to resolve secret '{name}': {source}")]
    Secret {
        name: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

/// Failures raised by a carrier adapter.
#[derive(Error, Debug)]
pub enum CarrierError {
    /// The carrier could not produce a usable checkpoint.
    #[error("{carrier} is unavailable: {cause}")]
    Unavailable {
        carrier: Carrier,
        #[source]
        cause: UnavailableCause,
    },

    /// Missing or malformed auxiliary credential. Raised before any request.
    #[error("{carrier} rejected the credential: {reason}")]
    InvalidCredential { carrier: Carrier, reason: String },
}

impl CarrierError {
    pub fn unavailable(carrier: Carrier, cause: impl Into<UnavailableCause>) -> Self {
        CarrierError::Unavailable {
            carrier,
            cause: cause.into(),
        }
    }

    pub fn carrier(&self) -> Carrier {
        match self {
            CarrierError::Unavailable { carrier, .. } => *carrier,
            CarrierError::InvalidCredential { carrier, .. } => *carrier,
        }
    }
}

#[derive(Error, Debug)]
pub enum UnavailableCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("carrier reported an error: {0}")]
    Rejected(String),

    #[error("no tracking checkpoints returned")]
    NoData,

    #[error("adapter not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, ShipTrackError>;
