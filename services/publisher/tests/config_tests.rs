//! Tests for publisher configuration loading and validation.

use std::path::PathBuf;

use aqi_common::{LongitudeStep, ObservationClass, PayloadMapping};
use interpolation::{DistanceMetric, Partitioning};
use publisher::config::{PublisherConfig, SinkTarget, SourceLocation};
use renderer::RenderMode;
use test_utils::fixtures::{config::PUBLISHER_YAML, payload_file};

fn repo_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/publisher.yaml")
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_fixture_parses() {
    let config = PublisherConfig::from_yaml(PUBLISHER_YAML).unwrap();

    assert_eq!(config.region.resolution, 0.01);
    assert_eq!(config.region.longitude_step, LongitudeStep::Same);
    assert_eq!(config.interpolation.metric, DistanceMetric::Planar);
    assert_eq!(config.interpolation.partitioning, Partitioning::Rows);
    assert_eq!(config.interpolation.radius.for_class(ObservationClass::Station), 0.05);
    assert_eq!(config.rendering.mode, RenderMode::Discrete);
    assert_eq!(config.rendering.boundaries.len(), 7);
    assert_eq!(config.schedule.interval_secs, 60);

    let source = &config.sources[0];
    assert_eq!(source.name, "stations");
    assert!(matches!(source.location, SourceLocation::File { .. }));
    assert!(matches!(source.mapping, PayloadMapping::Collection { .. }));

    assert_eq!(config.sink.channel, "image");
    assert!(matches!(config.sink.target, SinkTarget::File { .. }));
}

#[test]
fn test_shipped_config_is_valid() {
    let config = PublisherConfig::load(&repo_config()).unwrap();
    assert_eq!(config.sources.len(), 2);
    assert!(config.allow_partial_sources);
    assert_eq!(
        config.region.longitude_step,
        LongitudeStep::Factor { factor: 2.0 }
    );
    assert!(matches!(
        config.sink.target,
        SinkTarget::Redis { ttl_secs: Some(3600), .. }
    ));
    let SourceLocation::Http { headers, .. } = &config.sources[0].location else {
        panic!("expected an http source");
    };
    assert_eq!(headers.get("Fiware-Service").map(String::as_str), Some("aqi"));
}

#[test]
fn test_load_from_file() {
    let file = payload_file(PUBLISHER_YAML);
    let config = PublisherConfig::load(file.path()).unwrap();
    assert_eq!(config.sources.len(), 1);
}

#[test]
fn test_missing_file() {
    let err = PublisherConfig::load(&PathBuf::from("/nonexistent/publisher.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}

// ============================================================================
// Validation
// ============================================================================

fn invalid(from: &str, to: &str) -> bool {
    let yaml = PUBLISHER_YAML.replace(from, to);
    assert_ne!(yaml, PUBLISHER_YAML, "replacement '{}' did not apply", from);
    PublisherConfig::from_yaml(&yaml).is_err()
}

#[test]
fn test_inverted_bbox_rejected() {
    assert!(invalid("west: 23.70", "west: 24.70"));
}

#[test]
fn test_negative_resolution_rejected() {
    assert!(invalid("resolution: 0.01", "resolution: -0.01"));
}

#[test]
fn test_non_positive_radius_rejected() {
    assert!(invalid("mobile: 0.02", "mobile: 0.0"));
}

#[test]
fn test_bad_color_rejected() {
    assert!(invalid("\"#FF7E00\"", "\"orange\""));
}

#[test]
fn test_unsorted_boundaries_rejected() {
    assert!(invalid("value: 150", "value: 90"));
}

#[test]
fn test_opacity_out_of_range_rejected() {
    assert!(invalid("opacity: 0.6", "opacity: 1.6"));
}

#[test]
fn test_zero_interval_rejected() {
    assert!(invalid("interval_secs: 60", "interval_secs: 0"));
}

#[test]
fn test_unknown_source_kind_rejected() {
    assert!(invalid("kind: file\n    path", "kind: mqtt\n    path"));
}

#[test]
fn test_zero_batch_size_rejected() {
    assert!(invalid(
        "{ strategy: rows }",
        "{ strategy: observation_batches, batch_size: 0 }"
    ));
}

#[test]
fn test_no_sources_rejected() {
    let yaml = PUBLISHER_YAML
        .split("sources:")
        .next()
        .map(|head| format!("{}sources: []\nsink:\n  kind: file\n  directory: /tmp\n  channel: image\n", head))
        .unwrap();
    assert!(PublisherConfig::from_yaml(&yaml).is_err());
}
