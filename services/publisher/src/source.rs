//! Upstream observation sources.
//!
//! A source returns the current snapshot of one upstream feed, already
//! normalized by its [`PayloadMapping`]. Ingestion into those feeds runs
//! elsewhere; the publisher only reads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use aqi_common::{MappedBatch, MappingContext, ObservationClass, PayloadMapping, RawObservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{PublisherConfig, RadiusConfig, SourceConfig, SourceLocation};
use crate::metrics;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Payload from {source_name} is not valid JSON: {message}")]
    Json { source_name: String, message: String },

    #[error("Payload from {source_name} has the wrong shape: {message}")]
    Mapping { source_name: String, message: String },

    #[error("All {0} sources failed")]
    AllFailed(usize),

    #[error("Source {source_name} failed: {message}")]
    Failed { source_name: String, message: String },
}

/// Per-cycle settings used while mapping payloads.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub radius: RadiusConfig,
    pub missing_value: f64,
    pub now: DateTime<Utc>,
}

impl FetchSettings {
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            radius: config.interpolation.radius.clone(),
            missing_value: config.conversion.missing_value,
            now: Utc::now(),
        }
    }
}

/// Observations fetched in one cycle.
#[derive(Debug, Clone, Default)]
pub struct FetchedObservations {
    pub observations: Vec<RawObservation>,
    /// Records dropped while mapping.
    pub rejected: usize,
    /// Names of sources that failed but were tolerated.
    pub failed_sources: Vec<String>,
}

impl From<MappedBatch> for FetchedObservations {
    fn from(batch: MappedBatch) -> Self {
        Self {
            observations: batch.observations,
            rejected: batch.rejected,
            failed_sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ObservationSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the current snapshot.
    async fn fetch(&self, settings: &FetchSettings) -> Result<FetchedObservations, SourceError>;
}

/// Identity and mapping shared by the concrete sources.
#[derive(Debug, Clone)]
struct Feed {
    name: String,
    class: ObservationClass,
    mapping: PayloadMapping,
}

impl Feed {
    fn map(&self, payload: &Value, settings: &FetchSettings) -> Result<MappedBatch, SourceError> {
        let ctx = MappingContext {
            source: &self.name,
            class: self.class,
            default_radius: settings.radius.for_class(self.class),
            missing_value: settings.missing_value,
            now: settings.now,
        };
        let batch = self
            .mapping
            .apply(payload, &ctx)
            .map_err(|e| SourceError::Mapping {
                source_name: self.name.clone(),
                message: e.to_string(),
            })?;

        debug!(
            source = %self.name,
            observations = batch.observations.len(),
            rejected = batch.rejected,
            "Mapped payload"
        );
        Ok(batch)
    }

    fn parse(&self, body: &[u8]) -> Result<Value, SourceError> {
        serde_json::from_slice(body).map_err(|e| SourceError::Json {
            source_name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Reads JSON from an HTTP endpoint, e.g. a context broker query.
pub struct HttpSource {
    feed: Feed,
    url: String,
    headers: BTreeMap<String, String>,
    client: Client,
}

impl HttpSource {
    pub fn new(
        name: impl Into<String>,
        class: ObservationClass,
        url: impl Into<String>,
        mapping: PayloadMapping,
        client: Client,
    ) -> Self {
        Self {
            feed: Feed {
                name: name.into(),
                class,
                mapping,
            },
            url: url.into(),
            headers: BTreeMap::new(),
            client,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl ObservationSource for HttpSource {
    fn name(&self) -> &str {
        &self.feed.name
    }

    #[instrument(skip(self, settings), fields(source = %self.feed.name))]
    async fn fetch(&self, settings: &FetchSettings) -> Result<FetchedObservations, SourceError> {
        let http_err = |e: reqwest::Error| SourceError::Http {
            url: self.url.clone(),
            message: e.to_string(),
        };

        let mut request = self.client.get(&self.url);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(http_err)?;
        let payload = self.feed.parse(&body)?;
        Ok(self.feed.map(&payload, settings)?.into())
    }
}

/// Reads a JSON snapshot from disk on every fetch.
pub struct FileSource {
    feed: Feed,
    path: PathBuf,
}

impl FileSource {
    pub fn new(
        name: impl Into<String>,
        class: ObservationClass,
        path: impl Into<PathBuf>,
        mapping: PayloadMapping,
    ) -> Self {
        Self {
            feed: Feed {
                name: name.into(),
                class,
                mapping,
            },
            path: path.into(),
        }
    }
}

#[async_trait]
impl ObservationSource for FileSource {
    fn name(&self) -> &str {
        &self.feed.name
    }

    #[instrument(skip(self, settings), fields(source = %self.feed.name))]
    async fn fetch(&self, settings: &FetchSettings) -> Result<FetchedObservations, SourceError> {
        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SourceError::Io {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        let payload = self.feed.parse(&body)?;
        Ok(self.feed.map(&payload, settings)?.into())
    }
}

/// Fetches every configured source concurrently and merges the results.
pub struct CompositeSource {
    sources: Vec<Arc<dyn ObservationSource>>,
    allow_partial: bool,
}

impl CompositeSource {
    pub fn new(sources: Vec<Arc<dyn ObservationSource>>) -> Self {
        Self {
            sources,
            allow_partial: false,
        }
    }

    /// Tolerate failed sources as long as one succeeds.
    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    /// Build the sources described by `config`.
    pub fn from_config(config: &PublisherConfig, client: &Client) -> Self {
        let sources = config
            .sources
            .iter()
            .map(|source| build_source(source, client))
            .collect();
        Self::new(sources).allow_partial(config.allow_partial_sources)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn build_source(config: &SourceConfig, client: &Client) -> Arc<dyn ObservationSource> {
    match &config.location {
        SourceLocation::Http { url, headers } => Arc::new(
            HttpSource::new(
                config.name.clone(),
                config.class,
                url.clone(),
                config.mapping.clone(),
                client.clone(),
            )
            .with_headers(headers.clone()),
        ),
        SourceLocation::File { path } => Arc::new(FileSource::new(
            config.name.clone(),
            config.class,
            path.clone(),
            config.mapping.clone(),
        )),
    }
}

#[async_trait]
impl ObservationSource for CompositeSource {
    fn name(&self) -> &str {
        "composite"
    }

    async fn fetch(&self, settings: &FetchSettings) -> Result<FetchedObservations, SourceError> {
        let results = join_all(self.sources.iter().map(|s| s.fetch(settings))).await;

        let mut merged = FetchedObservations::default();
        let mut first_error = None;

        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(batch) => {
                    metrics::record_source(source.name(), batch.observations.len(), batch.rejected);
                    merged.observations.extend(batch.observations);
                    merged.rejected += batch.rejected;
                    merged.failed_sources.extend(batch.failed_sources);
                }
                Err(e) => {
                    metrics::record_source_failure(source.name());
                    warn!(source = %source.name(), error = %e, "Source fetch failed");
                    merged.failed_sources.push(source.name().to_string());
                    first_error.get_or_insert((source.name().to_string(), e));
                }
            }
        }

        match first_error {
            None => Ok(merged),
            Some(_) if self.allow_partial && merged.failed_sources.len() < self.sources.len() => {
                Ok(merged)
            }
            Some(_) if self.allow_partial => Err(SourceError::AllFailed(self.sources.len())),
            Some((source_name, e)) => Err(SourceError::Failed {
                source_name,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_common::{KeyPath, RecordMapping, ValueMapping};

    struct Fixed(&'static str, Option<usize>);

    #[async_trait]
    impl ObservationSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch(&self, settings: &FetchSettings) -> Result<FetchedObservations, SourceError> {
            let Some(count) = self.1 else {
                return Err(SourceError::Status {
                    url: format!("http://{}", self.0),
                    status: 503,
                });
            };
            let observations = (0..count)
                .map(|i| RawObservation {
                    latitude: 37.8,
                    longitude: 23.7 + i as f64 * 0.01,
                    value: aqi_common::ObservationValue::Index(50.0),
                    radius: 0.01,
                    timestamp: settings.now,
                    source_id: format!("{}_{}", self.0, i),
                    class: ObservationClass::Station,
                })
                .collect();
            Ok(FetchedObservations {
                observations,
                rejected: 1,
                failed_sources: Vec::new(),
            })
        }
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            radius: RadiusConfig::default(),
            missing_value: 10.0,
            now: Utc::now(),
        }
    }

    fn composite(sources: Vec<Fixed>, allow_partial: bool) -> CompositeSource {
        CompositeSource::new(
            sources
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn ObservationSource>)
                .collect(),
        )
        .allow_partial(allow_partial)
    }

    #[tokio::test]
    async fn test_composite_merges_sources() {
        let source = composite(vec![Fixed("a", Some(2)), Fixed("b", Some(3))], false);
        let fetched = tokio_test::assert_ok!(source.fetch(&settings()).await);
        assert_eq!(fetched.observations.len(), 5);
        assert_eq!(fetched.rejected, 2);
        assert!(fetched.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn test_composite_fails_on_any_failure_by_default() {
        let source = composite(vec![Fixed("a", Some(2)), Fixed("b", None)], false);
        let err = tokio_test::assert_err!(source.fetch(&settings()).await);
        assert!(matches!(err, SourceError::Failed { ref source_name, .. } if source_name == "b"));
    }

    #[tokio::test]
    async fn test_composite_partial() {
        let source = composite(vec![Fixed("a", Some(2)), Fixed("b", None)], true);
        let fetched = source.fetch(&settings()).await.unwrap();
        assert_eq!(fetched.observations.len(), 2);
        assert_eq!(fetched.failed_sources, vec!["b".to_string()]);

        let source = composite(vec![Fixed("a", None), Fixed("b", None)], true);
        assert!(matches!(
            source.fetch(&settings()).await,
            Err(SourceError::AllFailed(2))
        ));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
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
        let source = FileSource::new(
            "missing",
            ObservationClass::Station,
            "/nonexistent/aqi.json",
            mapping,
        );
        assert!(matches!(
            source.fetch(&settings()).await,
            Err(SourceError::Io { .. })
        ));
    }
}
