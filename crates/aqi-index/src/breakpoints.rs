//! Breakpoint tables for the supported pollutants.
//!
//! Each table maps concentration intervals onto the six AQI categories
//! (0-50, 51-100, 101-150, 151-200, 201-300, 301-500). Consecutive segments
//! leave a small gap between `conc_high` of one and `conc_low` of the next,
//! matching the precision at which concentrations are reported. A value
//! inside such a gap is out of range.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConversionError;

/// One linear piece of a breakpoint table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub conc_low: f64,
    pub conc_high: f64,
    pub aqi_low: u16,
    pub aqi_high: u16,
}

const fn seg(conc_low: f64, conc_high: f64, aqi_low: u16, aqi_high: u16) -> Segment {
    Segment {
        conc_low,
        conc_high,
        aqi_low,
        aqi_high,
    }
}

impl Segment {
    /// Linear interpolation of `value` inside this segment, rounded.
    pub fn index(&self, value: f64) -> u16 {
        let slope = f64::from(self.aqi_high - self.aqi_low) / (self.conc_high - self.conc_low);
        let aqi = slope * (value - self.conc_low) + f64::from(self.aqi_low);
        aqi.round().clamp(f64::from(self.aqi_low), f64::from(self.aqi_high)) as u16
    }
}

// µg/m³
const PM: &[Segment] = &[
    seg(0.0, 9.0, 0, 50),
    seg(9.1, 35.4, 51, 100),
    seg(35.5, 55.4, 101, 150),
    seg(55.5, 125.4, 151, 200),
    seg(125.5, 225.4, 201, 300),
    seg(225.5, 500.0, 301, 500),
];

// µg/m³, also used for dust
const PM10: &[Segment] = &[
    seg(0.0, 54.0, 0, 50),
    seg(54.1, 154.0, 51, 100),
    seg(154.1, 254.0, 101, 150),
    seg(254.1, 354.0, 151, 200),
    seg(354.1, 424.0, 201, 300),
    seg(424.1, 604.0, 301, 500),
];

// ppb
const NH3: &[Segment] = &[
    seg(0.0, 200.0, 0, 50),
    seg(200.1, 400.0, 51, 100),
    seg(400.1, 800.0, 101, 150),
    seg(800.1, 1200.0, 151, 200),
    seg(1200.1, 1800.0, 201, 300),
    seg(1800.1, 2400.0, 301, 500),
];

// ppb, oxidising and reducing gas sensors
const GASES: &[Segment] = &[
    seg(0.0, 100.0, 0, 50),
    seg(100.1, 200.0, 51, 100),
    seg(200.1, 300.0, 101, 150),
    seg(300.1, 400.0, 151, 200),
    seg(400.1, 500.0, 201, 300),
    seg(500.1, 600.0, 301, 500),
];

// ppm
const CO: &[Segment] = &[
    seg(0.0, 4.4, 0, 50),
    seg(4.5, 9.4, 51, 100),
    seg(9.5, 12.4, 101, 150),
    seg(12.5, 15.4, 151, 200),
    seg(15.5, 30.4, 201, 300),
    seg(30.5, 50.4, 301, 500),
];

// ppm
const CO2: &[Segment] = &[
    seg(0.0, 350.0, 0, 50),
    seg(350.1, 600.0, 51, 100),
    seg(600.1, 1000.0, 101, 150),
    seg(1000.1, 1500.0, 151, 200),
    seg(1500.1, 2000.0, 201, 300),
    seg(2000.1, 5000.0, 301, 500),
];

/// An ordered, strictly increasing list of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointTable {
    segments: Cow<'static, [Segment]>,
}

impl BreakpointTable {
    /// Build a custom table, checking that segments are well formed and
    /// strictly increasing in both concentration and AQI.
    pub fn new(segments: Vec<Segment>) -> Result<Self, ConversionError> {
        if segments.is_empty() {
            return Err(ConversionError::InvalidTable("table has no segments".into()));
        }

        for (i, s) in segments.iter().enumerate() {
            if !(s.conc_low.is_finite() && s.conc_high.is_finite() && s.conc_low < s.conc_high) {
                return Err(ConversionError::InvalidTable(format!(
                    "segment {} has an empty concentration range",
                    i
                )));
            }
            if s.aqi_low >= s.aqi_high || s.aqi_high > 500 {
                return Err(ConversionError::InvalidTable(format!(
                    "segment {} has an invalid AQI range {}-{}",
                    i, s.aqi_low, s.aqi_high
                )));
            }
        }

        if let Some(i) = segments
            .windows(2)
            .position(|w| w[1].conc_low <= w[0].conc_high || w[1].aqi_low <= w[0].aqi_high)
        {
            return Err(ConversionError::InvalidTable(format!(
                "segment {} overlaps segment {}",
                i + 1,
                i
            )));
        }

        Ok(Self {
            segments: Cow::Owned(segments),
        })
    }

    const fn builtin(segments: &'static [Segment]) -> Self {
        Self {
            segments: Cow::Borrowed(segments),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Inclusive concentration domain `(first.conc_low, last.conc_high)`.
    pub fn domain(&self) -> (f64, f64) {
        let first = self.segments.first().map_or(0.0, |s| s.conc_low);
        let last = self.segments.last().map_or(0.0, |s| s.conc_high);
        (first, last)
    }

    /// The segment containing `value`, or `None` when no segment does.
    ///
    /// Values in the reporting gap between two segments are not covered.
    pub fn segment_for(&self, value: f64) -> Option<&Segment> {
        let i = self.segments.partition_point(|s| s.conc_high < value);
        self.segments
            .get(i)
            .filter(|s| value >= s.conc_low && value <= s.conc_high)
    }

    /// AQI for `value`, or `None` outside every segment.
    pub fn index(&self, value: f64) -> Option<u16> {
        self.segment_for(value).map(|segment| segment.index(value))
    }
}

/// The pollutants with built-in tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    Pm1,
    Pm25,
    Pm10,
    Nh3,
    OxidisingGases,
    ReducingGases,
    Co,
    Co2,
    Dust,
}

impl Pollutant {
    pub const ALL: [Pollutant; 9] = [
        Pollutant::Pm1,
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::Nh3,
        Pollutant::OxidisingGases,
        Pollutant::ReducingGases,
        Pollutant::Co,
        Pollutant::Co2,
        Pollutant::Dust,
    ];

    /// Canonical name, as used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm1 => "pm1",
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::Nh3 => "nh3",
            Pollutant::OxidisingGases => "oxidising_gases",
            Pollutant::ReducingGases => "reducing_gases",
            Pollutant::Co => "co",
            Pollutant::Co2 => "co2",
            Pollutant::Dust => "dust",
        }
    }

    /// Resolve a parameter name. Matching ignores case and the separators
    /// `.`, `_`, `-` and spaces, so `PM2.5`, `pm2_5` and `pm25` are equal.
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '.' | '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        let pollutant = match key.as_str() {
            "pm1" => Pollutant::Pm1,
            "pm25" => Pollutant::Pm25,
            "pm10" => Pollutant::Pm10,
            "nh3" | "ammonia" => Pollutant::Nh3,
            "oxidisinggases" | "oxidizinggases" | "oxidisedgases" | "oxidizedgases" => {
                Pollutant::OxidisingGases
            }
            "reducinggases" | "reducedgases" => Pollutant::ReducingGases,
            "co" => Pollutant::Co,
            "co2" => Pollutant::Co2,
            "dust" => Pollutant::Dust,
            _ => return None,
        };
        Some(pollutant)
    }

    /// The built-in breakpoint table.
    pub fn table(&self) -> BreakpointTable {
        BreakpointTable::builtin(match self {
            Pollutant::Pm1 | Pollutant::Pm25 => PM,
            Pollutant::Pm10 | Pollutant::Dust => PM10,
            Pollutant::Nh3 => NH3,
            Pollutant::OxidisingGases | Pollutant::ReducingGases => GASES,
            Pollutant::Co => CO,
            Pollutant::Co2 => CO2,
        })
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pollutant {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pollutant::from_name(s).ok_or_else(|| ConversionError::UnknownParameter(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_valid() {
        for pollutant in Pollutant::ALL {
            let table = pollutant.table();
            assert!(
                BreakpointTable::new(table.segments().to_vec()).is_ok(),
                "{} table is malformed",
                pollutant
            );
            assert_eq!(table.segments().len(), 6);
            assert_eq!(table.segments()[5].aqi_high, 500);
        }
    }

    #[test]
    fn test_aliases() {
        for name in ["pm25", "PM2.5", "pm2_5", "Pm 2.5"] {
            assert_eq!(Pollutant::from_name(name), Some(Pollutant::Pm25), "{}", name);
        }
        assert_eq!(Pollutant::from_name("PM10"), Some(Pollutant::Pm10));
        assert_eq!(Pollutant::from_name("Oxidized Gases"), Some(Pollutant::OxidisingGases));
        assert_eq!(Pollutant::from_name("o3"), None);
    }

    #[test]
    fn test_gap_value_has_no_segment() {
        let table = Pollutant::Pm25.table();
        assert!(table.segment_for(9.05).is_none());
        assert_eq!(table.index(9.05), None);
        assert_eq!(table.index(9.1), Some(51));
    }

    #[test]
    fn test_overlapping_segments_rejected() {
        let result = BreakpointTable::new(vec![seg(0.0, 10.0, 0, 50), seg(9.0, 20.0, 51, 100)]);
        assert!(matches!(result, Err(ConversionError::InvalidTable(_))));
    }
}
