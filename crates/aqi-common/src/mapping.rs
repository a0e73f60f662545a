//! Payload mapping: turning upstream JSON into [`RawObservation`]s.
//!
//! Every source is paired with a [`PayloadMapping`] that says where the
//! records live in the payload and where each field lives inside a record.
//! Fields are addressed with dotted [`KeyPath`]s such as
//! `location.value.coordinates.0`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ObservationClass, ObservationValue, RawObservation, ValidationError};

/// A dotted path into a JSON document. Numeric segments index arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath {
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key path '{0}': segments must be non-empty")]
pub struct KeyPathError(String);

impl KeyPath {
    pub fn parse(path: &str) -> Result<Self, KeyPathError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(KeyPathError(path.to_string()));
        }
        Ok(Self { segments })
    }

    /// Follow the path; `None` if any segment is absent.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl TryFrom<String> for KeyPath {
    type Error = KeyPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyPath::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.to_string()
    }
}

/// Where the measured value of a record lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueMapping {
    /// The record carries a precomputed AQI.
    Index { path: KeyPath },
    /// The record carries raw concentrations, keyed by pollutant name.
    Concentrations { readings: BTreeMap<String, KeyPath> },
}

/// Field locations inside a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMapping {
    pub latitude: KeyPath,
    pub longitude: KeyPath,
    pub value: ValueMapping,
    #[serde(default)]
    pub id: Option<KeyPath>,
    #[serde(default)]
    pub timestamp: Option<KeyPath>,
    #[serde(default)]
    pub radius: Option<KeyPath>,
}

/// How a whole payload maps onto records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PayloadMapping {
    /// The payload is a single record.
    Record(RecordMapping),
    /// The payload, or the array found at `items`, is a list of records.
    Collection {
        #[serde(default)]
        items: Option<KeyPath>,
        record: RecordMapping,
    },
    /// An NGSI-v2 entity list. Coordinates are read from
    /// `location.value.coordinates` as `[latitude, longitude]` and each
    /// attribute from `<attribute>.value`.
    NgsiEntities {
        /// Attribute holding a precomputed AQI.
        #[serde(default)]
        index_attribute: Option<String>,
        /// Pollutant name to attribute name, used when no index attribute is set.
        #[serde(default)]
        readings: BTreeMap<String, String>,
        #[serde(default)]
        timestamp_attribute: Option<String>,
    },
}

/// Per-source settings applied while mapping.
#[derive(Debug, Clone)]
pub struct MappingContext<'a> {
    /// Source name, used to build ids for records that carry none.
    pub source: &'a str,
    pub class: ObservationClass,
    /// Radius used when a record carries none.
    pub default_radius: f64,
    /// AQI substituted for missing or non-numeric values such as `"-"`.
    pub missing_value: f64,
    /// Timestamp used when a record carries none.
    pub now: DateTime<Utc>,
}

/// Result of mapping one payload.
#[derive(Debug, Clone, Default)]
pub struct MappedBatch {
    pub observations: Vec<RawObservation>,
    /// Records dropped because they failed validation.
    pub rejected: usize,
}

impl PayloadMapping {
    /// Map a payload into observations. Malformed records are counted and
    /// skipped; only a payload of the wrong overall shape is an error.
    pub fn apply(
        &self,
        payload: &Value,
        ctx: &MappingContext<'_>,
    ) -> Result<MappedBatch, ValidationError> {
        match self {
            PayloadMapping::Record(record) => Ok(map_records(
                std::slice::from_ref(payload),
                record,
                ctx,
            )),
            PayloadMapping::Collection { items, record } => {
                let list = match items {
                    Some(path) => path.resolve(payload),
                    None => Some(payload),
                };
                let list = list
                    .and_then(Value::as_array)
                    .ok_or_else(|| ValidationError::NotAnArray(display_path(items.as_ref())))?;
                Ok(map_records(list, record, ctx))
            }
            PayloadMapping::NgsiEntities { .. } => {
                let record = self.ngsi_record_mapping()?;
                let list = payload
                    .as_array()
                    .ok_or_else(|| ValidationError::NotAnArray(display_path(None)))?;
                Ok(map_records(list, &record, ctx))
            }
        }
    }

    fn ngsi_record_mapping(&self) -> Result<RecordMapping, ValidationError> {
        let PayloadMapping::NgsiEntities {
            index_attribute,
            readings,
            timestamp_attribute,
        } = self
        else {
            return Err(ValidationError::NotAnObject);
        };

        let attribute = |name: &str| {
            KeyPath::parse(&format!("{name}.value"))
                .map_err(|_| ValidationError::MissingField(name.to_string()))
        };

        let value = match index_attribute {
            Some(name) => ValueMapping::Index {
                path: attribute(name)?,
            },
            None if readings.is_empty() => return Err(ValidationError::EmptyReadings),
            None => ValueMapping::Concentrations {
                readings: readings
                    .iter()
                    .map(|(pollutant, name)| {
                        Ok::<_, ValidationError>((pollutant.clone(), attribute(name)?))
                    })
                    .collect::<Result<_, ValidationError>>()?,
            },
        };

        Ok(RecordMapping {
            latitude: fixed_path(&["location", "value", "coordinates", "0"]),
            longitude: fixed_path(&["location", "value", "coordinates", "1"]),
            value,
            id: Some(fixed_path(&["id"])),
            timestamp: timestamp_attribute.as_deref().map(attribute).transpose()?,
            radius: None,
        })
    }
}

fn fixed_path(segments: &[&str]) -> KeyPath {
    KeyPath {
        segments: segments.iter().map(|s| s.to_string()).collect(),
    }
}

fn display_path(path: Option<&KeyPath>) -> String {
    path.map(ToString::to_string).unwrap_or_else(|| "$".to_string())
}

fn map_records(records: &[Value], mapping: &RecordMapping, ctx: &MappingContext<'_>) -> MappedBatch {
    let mut batch = MappedBatch::default();

    for (position, record) in records.iter().enumerate() {
        match map_record(record, position, mapping, ctx) {
            Ok(obs) => batch.observations.push(obs),
            Err(error) => {
                debug!(source = ctx.source, position, error = %error, "Dropping record");
                batch.rejected += 1;
            }
        }
    }

    if batch.rejected > 0 {
        warn!(
            source = ctx.source,
            rejected = batch.rejected,
            accepted = batch.observations.len(),
            "Dropped malformed records"
        );
    }

    batch
}

fn map_record(
    record: &Value,
    position: usize,
    mapping: &RecordMapping,
    ctx: &MappingContext<'_>,
) -> Result<RawObservation, ValidationError> {
    if !record.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    let latitude = required_number(record, &mapping.latitude)?;
    let longitude = required_number(record, &mapping.longitude)?;

    let value = match &mapping.value {
        ValueMapping::Index { path } => {
            ObservationValue::Index(optional_number(record, path).unwrap_or(ctx.missing_value))
        }
        ValueMapping::Concentrations { readings } => {
            let found: BTreeMap<String, f64> = readings
                .iter()
                .filter_map(|(pollutant, path)| {
                    optional_number(record, path).map(|v| (pollutant.clone(), v))
                })
                .collect();
            if found.is_empty() {
                ObservationValue::Index(ctx.missing_value)
            } else {
                ObservationValue::Concentrations(found)
            }
        }
    };

    let source_id = mapping
        .id
        .as_ref()
        .and_then(|path| path.resolve(record))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("{}_{}", ctx.source, position));

    let timestamp = mapping
        .timestamp
        .as_ref()
        .and_then(|path| path.resolve(record))
        .and_then(parse_timestamp)
        .unwrap_or(ctx.now);

    let radius = mapping
        .radius
        .as_ref()
        .and_then(|path| optional_number(record, path))
        .unwrap_or(ctx.default_radius);

    let obs = RawObservation {
        latitude,
        longitude,
        value,
        radius,
        timestamp,
        source_id,
        class: ctx.class,
    };
    obs.validate()?;
    Ok(obs)
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn required_number(record: &Value, path: &KeyPath) -> Result<f64, ValidationError> {
    match path.resolve(record) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(path.to_string())),
        Some(value) => as_number(value).ok_or_else(|| ValidationError::NonNumeric {
            field: path.to_string(),
            raw: value.to_string(),
        }),
    }
}

fn optional_number(record: &Value, path: &KeyPath) -> Option<f64> {
    path.resolve(record).and_then(as_number)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> MappingContext<'static> {
        MappingContext {
            source: "stations",
            class: ObservationClass::Station,
            default_radius: 0.05,
            missing_value: 10.0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_key_path_resolves_array_index() {
        let path = KeyPath::parse("location.coordinates.1").unwrap();
        let doc = json!({"location": {"coordinates": [37.9, 23.7]}});
        assert_eq!(path.resolve(&doc), Some(&json!(23.7)));
    }

    #[test]
    fn test_key_path_rejects_empty_segment() {
        assert!(KeyPath::parse("a..b").is_err());
        assert!(KeyPath::parse("").is_err());
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let doc = json!({"lat": "37.85", "lon": 23.75});
        let lat = required_number(&doc, &KeyPath::parse("lat").unwrap()).unwrap();
        assert!((lat - 37.85).abs() < 1e-12);
    }

    #[test]
    fn test_sentinel_replaced_by_missing_value() {
        let mapping = PayloadMapping::Record(RecordMapping {
            latitude: KeyPath::parse("lat").unwrap(),
            longitude: KeyPath::parse("lon").unwrap(),
            value: ValueMapping::Index {
                path: KeyPath::parse("aqi").unwrap(),
            },
            id: None,
            timestamp: None,
            radius: None,
        });

        let batch = mapping
            .apply(&json!({"lat": 37.85, "lon": 23.75, "aqi": "-"}), &ctx())
            .unwrap();

        assert_eq!(batch.rejected, 0);
        assert_eq!(batch.observations[0].value, ObservationValue::Index(10.0));
        assert_eq!(batch.observations[0].source_id, "stations_0");
    }
}
