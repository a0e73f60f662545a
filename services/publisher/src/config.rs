//! Publisher configuration.
//!
//! Loaded from a single YAML file (see `config/publisher.yaml`) and
//! validated once before the scheduler starts. Every cycle works on an
//! immutable snapshot of this value.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use aqi_common::{BoundingBox, GridBuilder, LongitudeStep, ObservationClass, PayloadMapping};
use interpolation::{DistanceMetric, Partitioning};
use renderer::{ColorBoundaries, ColorStop, RenderMode, RenderOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub region: RegionConfig,
    #[serde(default)]
    pub interpolation: InterpolationConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub rendering: RenderingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub sources: Vec<SourceConfig>,
    pub sink: SinkConfig,
    /// Publish from the sources that answered when some of them fail.
    #[serde(default)]
    pub allow_partial_sources: bool,
}

/// The published region and its grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub bbox: BoundingBox,
    /// Latitude step in degrees.
    pub resolution: f64,
    #[serde(default)]
    pub longitude_step: LongitudeStep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationConfig {
    #[serde(default = "default_base_value")]
    pub base_value: f64,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub partitioning: Partitioning,
    /// Influence radius per observation class, in the unit of `metric`.
    #[serde(default)]
    pub radius: RadiusConfig,
}

fn default_base_value() -> f64 {
    10.0
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            base_value: default_base_value(),
            metric: DistanceMetric::default(),
            partitioning: Partitioning::default(),
            radius: RadiusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusConfig {
    #[serde(default = "default_station_radius")]
    pub station: f64,
    #[serde(default = "default_mobile_radius")]
    pub mobile: f64,
    #[serde(default = "default_satellite_radius")]
    pub satellite: f64,
}

fn default_station_radius() -> f64 {
    0.01
}

fn default_mobile_radius() -> f64 {
    0.005
}

fn default_satellite_radius() -> f64 {
    0.05
}

impl Default for RadiusConfig {
    fn default() -> Self {
        Self {
            station: default_station_radius(),
            mobile: default_mobile_radius(),
            satellite: default_satellite_radius(),
        }
    }
}

impl RadiusConfig {
    pub fn for_class(&self, class: ObservationClass) -> f64 {
        match class {
            ObservationClass::Station => self.station,
            ObservationClass::Mobile => self.mobile,
            ObservationClass::Satellite => self.satellite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// AQI used for records reporting a sentinel such as `"-"`.
    #[serde(default = "default_missing_value")]
    pub missing_value: f64,
    /// AQI used for a reading that cannot be converted.
    #[serde(default = "default_missing_value")]
    pub fallback_severity: f64,
}

fn default_missing_value() -> f64 {
    10.0
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            missing_value: default_missing_value(),
            fallback_severity: default_missing_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingConfig {
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Empty means the standard AQI category colors.
    #[serde(default)]
    pub boundaries: Vec<ColorStop>,
    #[serde(default = "default_compression")]
    pub compression: u32,
}

fn default_opacity() -> f64 {
    0.6
}

fn default_compression() -> u32 {
    1
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            opacity: default_opacity(),
            boundaries: Vec::new(),
            compression: default_compression(),
        }
    }
}

impl RenderingConfig {
    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            mode: self.mode,
            opacity: self.opacity,
        }
    }

    pub fn color_boundaries(&self) -> Result<ColorBoundaries> {
        if self.boundaries.is_empty() {
            return Ok(ColorBoundaries::aqi_default());
        }
        ColorBoundaries::from_stops(&self.boundaries).context("Invalid rendering.boundaries")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
}

fn default_interval() -> u64 {
    180
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_publish_timeout() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            publish_timeout_secs: default_publish_timeout(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

/// One upstream observation source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub class: ObservationClass,
    #[serde(flatten)]
    pub location: SourceLocation,
    pub mapping: PayloadMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocation {
    /// JSON returned by an HTTP GET.
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// JSON snapshot on disk.
    File { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Channel (topic) the raster is published on.
    pub channel: String,
    #[serde(flatten)]
    pub target: SinkTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkTarget {
    /// `<channel>.png` and `<channel>.json` in a directory.
    File { directory: PathBuf },
    /// Redis pub/sub plus `<channel>:latest` and `<channel>:meta` keys.
    Redis {
        url: String,
        /// Expiry of the stored keys; none keeps them until overwritten.
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
}

impl PublisherConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        info!(
            path = %path.display(),
            sources = config.sources.len(),
            channel = %config.sink.channel,
            "Loaded publisher configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        self.region
            .bbox
            .validate()
            .context("Invalid region.bbox")?;
        GridBuilder::new(self.region.bbox, self.region.resolution)
            .longitude_step(self.region.longitude_step)
            .lon_step()
            .context("Invalid region grid")?;

        if !self.interpolation.base_value.is_finite() {
            bail!("interpolation.base_value must be finite");
        }
        let radius = &self.interpolation.radius;
        for (class, r) in [
            ("station", radius.station),
            ("mobile", radius.mobile),
            ("satellite", radius.satellite),
        ] {
            if !(r.is_finite() && r > 0.0) {
                bail!("interpolation.radius.{} must be positive, got {}", class, r);
            }
        }
        if let Partitioning::ObservationBatches { batch_size: 0 } = self.interpolation.partitioning
        {
            bail!("interpolation.partitioning.batch_size must be at least 1");
        }

        if !self.conversion.missing_value.is_finite()
            || !self.conversion.fallback_severity.is_finite()
        {
            bail!("conversion values must be finite");
        }

        self.rendering
            .options()
            .validate()
            .context("Invalid rendering options")?;
        self.rendering.color_boundaries()?;
        if self.rendering.compression > 9 {
            bail!("rendering.compression must be 0-9");
        }

        if self.schedule.interval_secs == 0 {
            bail!("schedule.interval_secs must be at least 1");
        }
        if self.schedule.fetch_timeout_secs == 0 || self.schedule.publish_timeout_secs == 0 {
            bail!("schedule timeouts must be at least 1 second");
        }

        if self.sources.is_empty() {
            bail!("At least one source must be configured");
        }
        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                bail!("Duplicate source name '{}'", source.name);
            }
        }

        if self.sink.channel.is_empty()
            || self
                .sink
                .channel
                .contains(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        {
            bail!("Invalid sink.channel '{}'", self.sink.channel);
        }

        debug!("Configuration validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
region:
  bbox: { west: 0.0, south: 0.0, east: 1.0, north: 1.0 }
  resolution: 0.1
sources:
  - name: a
    class: mobile
    kind: http
    url: http://localhost:1026/v2/entities
    mapping: { strategy: ngsi_entities, index_attribute: aqi }
sink:
  kind: redis
  url: redis://localhost:6379
  channel: heatmap
"#;

    #[test]
    fn test_defaults_applied() {
        let config = PublisherConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.interpolation.base_value, 10.0);
        assert_eq!(config.interpolation.metric, DistanceMetric::Planar);
        assert_eq!(config.schedule.interval_secs, 180);
        assert_eq!(config.rendering.opacity, 0.6);
        assert!(!config.allow_partial_sources);
        assert_eq!(config.interpolation.radius.for_class(ObservationClass::Mobile), 0.005);
        assert!(matches!(
            config.sink.target,
            SinkTarget::Redis { ttl_secs: None, .. }
        ));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let yaml = MINIMAL.replace("resolution: 0.1", "resolution: 0.0");
        assert!(PublisherConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_channel_with_slash_rejected() {
        let yaml = MINIMAL.replace("channel: heatmap", "channel: a/b");
        assert!(PublisherConfig::from_yaml(&yaml).is_err());
    }
}
