//! The compute half of a cycle: conversion, grid, interpolation, rendering.
//!
//! Everything here is synchronous and CPU-bound; the scheduler runs
//! [`render`] on the blocking pool.

use aqi_common::{CycleError, CycleStage, GridBuilder, Observation, ObservationValue, RawObservation};
use aqi_index::AqiConverter;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use interpolation::InterpolationEngine;
use renderer::{rasterize, EncodedRaster, PngEncoder, RasterMetadata};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::metrics::{self, Timer};

/// Observations ready for interpolation.
#[derive(Debug, Clone, Default)]
pub struct Converted {
    pub observations: Vec<Observation>,
    /// Records dropped because the converted observation was invalid.
    pub rejected: usize,
}

/// Resolve every raw observation to a single AQI.
///
/// Concentration sets take the worst pollutant; readings that cannot be
/// converted count as `fallback`.
pub fn convert(raw: Vec<RawObservation>, converter: &AqiConverter, fallback: f64) -> Converted {
    let mut converted = Converted::default();

    for record in raw {
        let aqi = match &record.value {
            ObservationValue::Index(value) => *value,
            ObservationValue::Concentrations(readings) => converter
                .overall_index(readings.iter().map(|(k, v)| (k.as_str(), *v)), fallback)
                .unwrap_or(fallback),
        };

        let observation = record.with_index(aqi);
        match observation.validate() {
            Ok(()) => converted.observations.push(observation),
            Err(e) => {
                debug!(source_id = %observation.source_id, error = %e, "Dropping observation");
                converted.rejected += 1;
            }
        }
    }

    converted
}

/// Identity of the raster a cycle produces.
#[derive(Debug, Clone, Copy)]
pub struct CycleStamp {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

/// Build the grid, interpolate and encode the raster. `on_stage` is told
/// when each stage begins.
pub fn render<F>(
    config: &PublisherConfig,
    observations: &[Observation],
    stamp: CycleStamp,
    on_stage: F,
) -> Result<EncodedRaster, CycleError>
where
    F: Fn(CycleStage),
{
    on_stage(CycleStage::Building);
    let timer = Timer::start();
    let region = &config.region;
    let grid = GridBuilder::new(region.bbox, region.resolution)
        .longitude_step(region.longitude_step)
        .build()?;
    metrics::record_stage(CycleStage::Building, timer.elapsed_ms());

    on_stage(CycleStage::Interpolating);
    let timer = Timer::start();
    let settings = &config.interpolation;
    let field = InterpolationEngine::new(settings.base_value, settings.metric)
        .with_partitioning(settings.partitioning)
        .interpolate(&grid, observations);
    metrics::record_stage(CycleStage::Interpolating, timer.elapsed_ms());

    on_stage(CycleStage::Rendering);
    let timer = Timer::start();
    let boundaries = config
        .rendering
        .color_boundaries()
        .map_err(|e| CycleError::Config(format!("{:#}", e)))?;
    let image = rasterize(
        field.values(),
        field.width(),
        field.height(),
        &boundaries,
        &config.rendering.options(),
    )
    .map_err(|e| CycleError::Render(e.to_string()))?;

    let stats = field.stats();
    let metadata = RasterMetadata {
        cycle_id: stamp.cycle_id,
        generated_at: stamp.generated_at,
        bbox: region.bbox,
        width: field.width(),
        height: field.height(),
        observation_count: observations.len(),
        field_min: stats.map(|s| s.min),
        field_max: stats.map(|s| s.max),
        field_mean: stats.map(|s| s.mean),
    };

    let png = PngEncoder::new()
        .with_compression(config.rendering.compression)
        .with_texts(metadata.text_entries())
        .encode(&image)
        .map_err(|e| CycleError::Render(e.to_string()))?;
    metrics::record_stage(CycleStage::Rendering, timer.elapsed_ms());

    info!(
        cycle_id = %stamp.cycle_id,
        width = metadata.width,
        height = metadata.height,
        observations = observations.len(),
        bytes = png.len(),
        "Rendered raster"
    );

    Ok(EncodedRaster {
        png: Bytes::from(png),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_common::ObservationClass;
    use std::collections::BTreeMap;

    fn raw(value: ObservationValue) -> RawObservation {
        RawObservation {
            latitude: 37.85,
            longitude: 23.75,
            value,
            radius: 0.01,
            timestamp: Utc::now(),
            source_id: "car-7".to_string(),
            class: ObservationClass::Mobile,
        }
    }

    #[test]
    fn test_convert_takes_worst_pollutant() {
        let readings = BTreeMap::from([
            ("pm25".to_string(), 40.0),
            ("pm10".to_string(), 20.0),
            ("o3".to_string(), 70.0),
        ]);
        let converted = convert(
            vec![raw(ObservationValue::Concentrations(readings))],
            &AqiConverter::new(),
            10.0,
        );
        assert_eq!(converted.observations.len(), 1);
        assert_eq!(converted.observations[0].value, 112.0);
    }

    #[test]
    fn test_convert_unknown_only_uses_fallback() {
        let readings = BTreeMap::from([("o3".to_string(), 70.0)]);
        let converted = convert(
            vec![raw(ObservationValue::Concentrations(readings))],
            &AqiConverter::new(),
            10.0,
        );
        assert_eq!(converted.observations[0].value, 10.0);
    }

    #[test]
    fn test_convert_drops_invalid() {
        let mut bad = raw(ObservationValue::Index(50.0));
        bad.radius = 0.0;
        let converted = convert(
            vec![bad, raw(ObservationValue::Index(50.0))],
            &AqiConverter::new(),
            10.0,
        );
        assert_eq!(converted.observations.len(), 1);
        assert_eq!(converted.rejected, 1);
    }
}
