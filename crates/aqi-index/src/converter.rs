//! Concentration to AQI conversion.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::{BreakpointTable, Pollutant};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Value {value} outside the {parameter} breakpoint domain")]
    OutOfRange { parameter: String, value: f64 },

    #[error("Invalid breakpoint table: {0}")]
    InvalidTable(String),
}

/// Converts pollutant concentrations to AQI values.
///
/// Built-in tables cover the [`Pollutant`] set; extra parameters can be
/// registered with [`AqiConverter::with_table`].
#[derive(Debug, Clone, Default)]
pub struct AqiConverter {
    custom: HashMap<String, BreakpointTable>,
}

impl AqiConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table for a parameter, replacing any built-in table of
    /// the same name. Pollutant aliases resolve to the same entry
    /// (`PM2.5` replaces the `pm25` table); other names are matched
    /// case-insensitively.
    pub fn with_table(mut self, parameter: &str, table: BreakpointTable) -> Self {
        self.custom.insert(Self::key(parameter), table);
        self
    }

    fn key(parameter: &str) -> String {
        match Pollutant::from_name(parameter) {
            Some(pollutant) => pollutant.as_str().to_string(),
            None => parameter.to_lowercase(),
        }
    }

    fn table(&self, parameter: &str) -> Option<BreakpointTable> {
        if let Some(table) = self.custom.get(&Self::key(parameter)) {
            return Some(table.clone());
        }
        Pollutant::from_name(parameter).map(|pollutant| pollutant.table())
    }

    /// AQI in `[0, 500]` for one concentration.
    pub fn convert(&self, parameter: &str, value: f64) -> Result<u16, ConversionError> {
        let table = self
            .table(parameter)
            .ok_or_else(|| ConversionError::UnknownParameter(parameter.to_string()))?;

        table.index(value).ok_or_else(|| ConversionError::OutOfRange {
            parameter: parameter.to_string(),
            value,
        })
    }

    /// Combined index for a set of readings: the worst pollutant governs.
    ///
    /// A reading that cannot be converted contributes `fallback` instead.
    /// Returns `None` when there are no readings at all.
    pub fn overall_index<'a, I>(&self, readings: I, fallback: f64) -> Option<f64>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        readings
            .into_iter()
            .map(|(parameter, value)| match self.convert(parameter, value) {
                Ok(aqi) => f64::from(aqi),
                Err(e) => {
                    debug!(parameter, value, error = %e, "Using fallback severity");
                    fallback
                }
            })
            .reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Segment;

    #[test]
    fn test_unknown_parameter() {
        let converter = AqiConverter::new();
        assert_eq!(
            converter.convert("o3", 10.0),
            Err(ConversionError::UnknownParameter("o3".into()))
        );
    }

    #[test]
    fn test_custom_table() {
        let table = BreakpointTable::new(vec![
            Segment {
                conc_low: 0.0,
                conc_high: 54.0,
                aqi_low: 0,
                aqi_high: 50,
            },
            Segment {
                conc_low: 55.0,
                conc_high: 70.0,
                aqi_low: 51,
                aqi_high: 100,
            },
        ])
        .unwrap();
        let converter = AqiConverter::new().with_table("O3", table);
        assert_eq!(converter.convert("o3", 54.0).unwrap(), 50);
        assert_eq!(converter.convert("o3", 70.0).unwrap(), 100);
    }

    #[test]
    fn test_custom_table_replaces_builtin_through_alias() {
        let table = BreakpointTable::new(vec![Segment {
            conc_low: 0.0,
            conc_high: 100.0,
            aqi_low: 0,
            aqi_high: 500,
        }])
        .unwrap();
        let converter = AqiConverter::new().with_table("PM2.5", table);
        assert_eq!(converter.convert("pm25", 40.0).unwrap(), 200);
        assert_eq!(converter.convert("pm2_5", 40.0).unwrap(), 200);
        assert_eq!(converter.convert("pm10", 40.0).unwrap(), 37);
    }

    #[test]
    fn test_overall_index_empty() {
        let converter = AqiConverter::new();
        assert_eq!(converter.overall_index(std::iter::empty(), 10.0), None);
    }
}
