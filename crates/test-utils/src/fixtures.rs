//! Common test fixtures for the AQI field publisher.
//!
//! Payloads mirror the shapes the publisher reads from upstream sources.

/// Common bounding box definitions for testing, as `(west, south, east, north)`.
pub mod bbox {
    /// Central Athens, the reference region of the interpolation tests.
    pub const ATHENS_CENTER: (f64, f64, f64, f64) = (23.70, 37.80, 23.80, 37.90);

    /// Greater Attica.
    pub const ATTICA: (f64, f64, f64, f64) = (23.40, 37.70, 24.10, 38.20);

    /// A unit square at the origin.
    pub const UNIT: (f64, f64, f64, f64) = (0.0, 0.0, 1.0, 1.0);

    /// Zero-area box.
    pub const POINT: (f64, f64, f64, f64) = (23.75, 37.85, 23.75, 37.85);

    /// Invalid bbox (east < west)
    pub const INVERTED: (f64, f64, f64, f64) = (24.0, 37.8, 23.0, 37.9);
}

/// Upstream payload samples.
pub mod payloads {
    /// A station list nested under `data.stations`, with an AQI per station.
    /// The third station reports the `"-"` sentinel, the fourth has no latitude.
    pub const STATION_COLLECTION: &str = r#"{
        "data": {
            "stations": [
                {"id": "st-1", "lat": 37.85, "lon": 23.75, "aqi": 90, "time": "2024-03-01T10:00:00Z"},
                {"id": "st-2", "lat": "37.81", "lon": "23.71", "aqi": "42"},
                {"id": "st-3", "lat": 37.88, "lon": 23.78, "aqi": "-"},
                {"id": "st-4", "lon": 23.72, "aqi": 30}
            ]
        }
    }"#;

    /// A single vehicle record carrying raw concentrations.
    pub const CAR_RECORD: &str = r#"{
        "vehicle": "car-7",
        "position": {"latitude": 37.86, "longitude": 23.74},
        "pm1": 5.0,
        "pm25": 40.0,
        "pm10": 20.0,
        "co": "-",
        "co2": 410.0
    }"#;

    /// An NGSI-v2 entity list with `[latitude, longitude]` coordinates.
    pub const NGSI_ENTITIES: &str = r#"[
        {
            "id": "urn:ngsi:AirQualityObserved:1",
            "type": "AirQualityObserved",
            "location": {"type": "geo:json", "value": {"type": "Point", "coordinates": [37.84, 23.73]}},
            "pm25": {"type": "Number", "value": 12.0},
            "pm10": {"type": "Number", "value": 60.0},
            "dateObserved": {"type": "DateTime", "value": "2024-03-01T09:30:00Z"}
        },
        {
            "id": "urn:ngsi:AirQualityObserved:2",
            "type": "AirQualityObserved",
            "location": {"type": "geo:json", "value": {"type": "Point", "coordinates": [37.89, 23.79]}},
            "pm25": {"type": "Number", "value": "-"},
            "pm10": {"type": "Number", "value": 20.0}
        }
    ]"#;
}

/// Configuration samples.
pub mod config {
    /// A complete publisher configuration reading one file source.
    pub const PUBLISHER_YAML: &str = r##"
region:
  bbox: { west: 23.70, south: 37.80, east: 23.80, north: 37.90 }
  resolution: 0.01
  longitude_step: { mode: same }
interpolation:
  base_value: 10.0
  metric: planar
  partitioning: { strategy: rows }
  radius:
    station: 0.05
    mobile: 0.02
    satellite: 0.1
conversion:
  missing_value: 10.0
  fallback_severity: 10.0
rendering:
  mode: discrete
  opacity: 0.6
  boundaries:
    - { value: 0, color: "#00E400" }
    - { value: 50, color: "#FFFF00" }
    - { value: 100, color: "#FF7E00" }
    - { value: 150, color: "#FF0000" }
    - { value: 200, color: "#8F3F97" }
    - { value: 300, color: "#7E0023" }
    - { value: 500, color: "#4C0015" }
schedule:
  interval_secs: 60
  fetch_timeout_secs: 10
  publish_timeout_secs: 5
sources:
  - name: stations
    class: station
    kind: file
    path: /tmp/stations.json
    mapping:
      strategy: collection
      items: data.stations
      record:
        latitude: lat
        longitude: lon
        id: id
        timestamp: time
        value: { kind: index, path: aqi }
sink:
  kind: file
  directory: /tmp/aqi-out
  channel: image
"##;
}

/// Writes `contents` to a fresh temporary file, e.g. for a file source.
///
/// The file is removed when the returned handle is dropped.
pub fn payload_file(contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().expect("create temp payload file");
    file.write_all(contents.as_bytes())
        .expect("write temp payload file");
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_fixtures_are_ordered() {
        let (w, s, e, n) = bbox::ATHENS_CENTER;
        assert!(w < e && s < n);
        let (w, _, e, _) = bbox::INVERTED;
        assert!(w > e);
    }

    #[test]
    fn test_payload_file_round_trips() {
        let file = payload_file(payloads::CAR_RECORD);
        let read = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(read, payloads::CAR_RECORD);
    }
}
