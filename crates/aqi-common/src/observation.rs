//! Point observations feeding the interpolation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Kind of platform an observation came from. Each class has its own
/// default influence radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationClass {
    /// Fixed monitoring station.
    Station,
    /// Vehicle-mounted sensor kit.
    Mobile,
    /// Satellite-derived product sampled at a point.
    Satellite,
}

impl ObservationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationClass::Station => "station",
            ObservationClass::Mobile => "mobile",
            ObservationClass::Satellite => "satellite",
        }
    }
}

/// What an observation measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationValue {
    /// An AQI computed upstream.
    Index(f64),
    /// Raw pollutant concentrations keyed by parameter name, to be converted.
    Concentrations(BTreeMap<String, f64>),
}

/// A normalized record before AQI conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub latitude: f64,
    pub longitude: f64,
    pub value: ObservationValue,
    /// Influence radius in the unit of the configured distance metric.
    pub radius: f64,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub class: ObservationClass,
}

impl RawObservation {
    /// Check coordinates, radius and value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_point(self.latitude, self.longitude, self.radius)?;
        match &self.value {
            ObservationValue::Index(v) if !v.is_finite() => Err(ValidationError::NonFiniteValue),
            ObservationValue::Concentrations(readings) if readings.is_empty() => {
                Err(ValidationError::EmptyReadings)
            }
            ObservationValue::Concentrations(readings)
                if readings.values().any(|v| !v.is_finite()) =>
            {
                Err(ValidationError::NonFiniteValue)
            }
            _ => Ok(()),
        }
    }

    /// Attach a resolved AQI, producing an interpolation input.
    pub fn with_index(self, value: f64) -> Observation {
        Observation {
            latitude: self.latitude,
            longitude: self.longitude,
            value,
            radius: self.radius,
            timestamp: self.timestamp,
            source_id: self.source_id,
        }
    }
}

/// One interpolation input: an AQI at a point with an influence radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
    pub radius: f64,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
}

impl Observation {
    /// Create an observation stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, value: f64, radius: f64) -> Self {
        Self {
            latitude,
            longitude,
            value,
            radius,
            timestamp: Utc::now(),
            source_id: String::new(),
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_point(self.latitude, self.longitude, self.radius)?;
        if !self.value.is_finite() {
            return Err(ValidationError::NonFiniteValue);
        }
        Ok(())
    }
}

fn validate_point(latitude: f64, longitude: f64, radius: f64) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(ValidationError::InvalidRadius(radius));
    }
    Ok(())
}
