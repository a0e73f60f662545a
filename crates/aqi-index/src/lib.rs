//! Air Quality Index conversion.
//!
//! Converts raw pollutant concentrations to AQI values on the 0-500 scale
//! using per-pollutant breakpoint tables, and combines several readings
//! into one index where the worst pollutant governs.
//!
//! ```
//! use aqi_index::AqiConverter;
//!
//! let converter = AqiConverter::new();
//! assert_eq!(converter.convert("pm25", 9.0).unwrap(), 50);
//! assert_eq!(converter.convert("PM2.5", 40.0).unwrap(), 112);
//! ```

pub mod breakpoints;
pub mod converter;

pub use breakpoints::{BreakpointTable, Pollutant, Segment};
pub use converter::{AqiConverter, ConversionError};
