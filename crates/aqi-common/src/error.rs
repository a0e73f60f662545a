//! Error types for the AQI field publisher.
//!
//! Errors are split by scope:
//! - [`ValidationError`]: one malformed record, dropped without failing the batch
//! - [`GridError`]: an unusable grid definition
//! - [`CycleError`]: one refresh cycle failed and publishes nothing

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using CycleError.
pub type CycleResult<T> = Result<T, CycleError>;

/// A single observation record could not be normalized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("expected an array of records at '{0}'")]
    NotAnArray(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is not numeric: {raw}")]
    NonNumeric { field: String, raw: String },

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("influence radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("observation value is not finite")]
    NonFiniteValue,

    #[error("record carries no pollutant readings")]
    EmptyReadings,
}

/// A grid cannot be built from the requested definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("grid resolution must be positive and finite, got {0}")]
    InvalidResolution(f64),

    #[error("longitude step must be positive and finite, got {0}")]
    InvalidLongitudeStep(f64),
}

/// Stages of a refresh cycle, in execution order.
///
/// `Idle` is both the start and the end of every cycle, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Fetching,
    Converting,
    Building,
    Interpolating,
    Rendering,
    Publishing,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Fetching => "fetching",
            CycleStage::Converting => "converting",
            CycleStage::Building => "building",
            CycleStage::Interpolating => "interpolating",
            CycleStage::Rendering => "rendering",
            CycleStage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refresh cycle failed. The cycle publishes nothing and the next tick
/// starts over from a fresh fetch.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    // === Upstream ===
    #[error("Observation fetch failed: {0}")]
    Fetch(String),

    // === Computation ===
    #[error("Rendering failed: {0}")]
    Render(String),

    // === Downstream ===
    #[error("Publish failed: {0}")]
    Publish(String),

    // === Setup ===
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CycleError {
    /// The stage the cycle was in when it failed.
    pub fn stage(&self) -> CycleStage {
        match self {
            CycleError::Fetch(_) => CycleStage::Fetching,
            CycleError::Render(_) => CycleStage::Rendering,
            CycleError::Publish(_) => CycleStage::Publishing,
            CycleError::Config(_) => CycleStage::Building,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch",
            CycleError::Render(_) => "render",
            CycleError::Publish(_) => "publish",
            CycleError::Config(_) => "config",
        }
    }
}

impl From<GridError> for CycleError {
    fn from(err: GridError) -> Self {
        CycleError::Config(err.to_string())
    }
}
