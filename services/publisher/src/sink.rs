//! Publish sinks: where finished rasters go.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use renderer::EncodedRaster;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{SinkConfig, SinkTarget};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Failed to serialize metadata: {0}")]
    Serialize(String),
}

#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Human-readable target, for logs and the status API.
    fn describe(&self) -> String;

    /// Publish `raster` on `channel`. Consumers must never observe a
    /// partially written raster.
    async fn publish(&self, channel: &str, raster: &EncodedRaster) -> Result<(), SinkError>;
}

/// Build the sink described by `config`.
pub fn from_config(config: &SinkConfig) -> Result<Box<dyn PublishSink>, SinkError> {
    match &config.target {
        SinkTarget::File { directory } => Ok(Box::new(FileSink::new(directory.clone()))),
        SinkTarget::Redis { url, ttl_secs } => {
            let sink = RedisSink::new(url)?;
            Ok(Box::new(match ttl_secs {
                Some(secs) => sink.with_ttl(Duration::from_secs(*secs)),
                None => sink,
            }))
        }
    }
}

fn metadata_json(raster: &EncodedRaster) -> Result<Vec<u8>, SinkError> {
    serde_json::to_vec_pretty(&raster.metadata).map_err(|e| SinkError::Serialize(e.to_string()))
}

// ============================================================================
// File sink
// ============================================================================

/// Writes `<channel>.png` and `<channel>.json` into a directory.
///
/// Both files are staged as temporaries and committed PNG first, metadata
/// second. A failed metadata commit puts the previous PNG back, so the pair
/// on disk always comes from a single cycle. The commit runs on a blocking
/// task that finishes even when the caller's future is dropped by a timeout.
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn png_path(&self, channel: &str) -> PathBuf {
        self.directory.join(format!("{}.png", channel))
    }

    pub fn metadata_path(&self, channel: &str) -> PathBuf {
        self.directory.join(format!("{}.json", channel))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Hidden sibling of `path`, e.g. `.image.png.<uuid>.tmp`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}", file_name, uuid::Uuid::new_v4(), suffix))
}

fn remove_quietly(paths: &[&Path]) {
    for path in paths {
        std::fs::remove_file(path).ok();
    }
}

fn commit_pair(
    png_path: &Path,
    png: &[u8],
    meta_path: &Path,
    metadata: &[u8],
) -> Result<(), SinkError> {
    let png_tmp = sibling(png_path, "tmp");
    let meta_tmp = sibling(meta_path, "tmp");

    if let Err(e) = std::fs::write(&png_tmp, png) {
        remove_quietly(&[png_tmp.as_path()]);
        return Err(io_err(&png_tmp, e));
    }
    if let Err(e) = std::fs::write(&meta_tmp, metadata) {
        remove_quietly(&[png_tmp.as_path(), meta_tmp.as_path()]);
        return Err(io_err(&meta_tmp, e));
    }

    // a hard link leaves the current PNG readable until it is replaced
    let backup = sibling(png_path, "bak");
    let has_backup = png_path.is_file() && std::fs::hard_link(png_path, &backup).is_ok();

    if let Err(e) = std::fs::rename(&png_tmp, png_path) {
        remove_quietly(&[png_tmp.as_path(), meta_tmp.as_path(), backup.as_path()]);
        return Err(io_err(png_path, e));
    }

    if let Err(e) = std::fs::rename(&meta_tmp, meta_path) {
        let rollback = if has_backup {
            std::fs::rename(&backup, png_path)
        } else {
            std::fs::remove_file(png_path)
        };
        if let Err(re) = rollback {
            warn!(path = %png_path.display(), error = %re, "Failed to roll back PNG");
        }
        remove_quietly(&[meta_tmp.as_path(), backup.as_path()]);
        return Err(io_err(meta_path, e));
    }

    remove_quietly(&[backup.as_path()]);
    Ok(())
}

#[async_trait]
impl PublishSink for FileSink {
    fn describe(&self) -> String {
        format!("file://{}", self.directory.display())
    }

    #[instrument(skip(self, raster), fields(cycle_id = %raster.metadata.cycle_id))]
    async fn publish(&self, channel: &str, raster: &EncodedRaster) -> Result<(), SinkError> {
        let metadata = metadata_json(raster)?;
        let directory = self.directory.clone();
        let png_path = self.png_path(channel);
        let meta_path = self.metadata_path(channel);
        let png = raster.png.clone();

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&directory).map_err(|e| io_err(&directory, e))?;
            commit_pair(&png_path, &png, &meta_path, &metadata)
        })
        .await
        .map_err(|e| SinkError::Io {
            path: self.directory.clone(),
            message: format!("Publish task failed: {}", e),
        })??;

        debug!(
            path = %self.png_path(channel).display(),
            bytes = raster.png.len(),
            "Wrote raster"
        );
        Ok(())
    }
}

// ============================================================================
// Redis sink
// ============================================================================

/// Publishes the PNG bytes on a Redis pub/sub channel and keeps the latest
/// raster under `<channel>:latest` with its metadata under `<channel>:meta`.
///
/// The connection is opened on first use and reopened after a failure, so
/// an unavailable Redis only fails the cycles that run while it is down.
pub struct RedisSink {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    ttl: Option<Duration>,
}

impl RedisSink {
    pub fn new(redis_url: &str) -> Result<Self, SinkError> {
        let client = Client::open(redis_url)
            .map_err(|e| SinkError::Redis(format!("Invalid Redis URL: {}", e)))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            ttl: None,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, SinkError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SinkError::Redis(format!("Redis connection failed: {}", e)))?;
        info!("Connected to Redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl PublishSink for RedisSink {
    fn describe(&self) -> String {
        let info = self.client.get_connection_info();
        format!("redis://{}", info.addr)
    }

    #[instrument(skip(self, raster), fields(cycle_id = %raster.metadata.cycle_id))]
    async fn publish(&self, channel: &str, raster: &EncodedRaster) -> Result<(), SinkError> {
        let metadata = metadata_json(raster)?;
        let latest_key = format!("{}:latest", channel);
        let meta_key = format!("{}:meta", channel);

        let mut pipe = redis::pipe();
        pipe.atomic();
        match self.ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                pipe.set_ex(&latest_key, raster.png.as_ref(), secs).ignore();
                pipe.set_ex(&meta_key, metadata.as_slice(), secs).ignore();
            }
            None => {
                pipe.set(&latest_key, raster.png.as_ref()).ignore();
                pipe.set(&meta_key, metadata.as_slice()).ignore();
            }
        }
        pipe.publish(channel, raster.png.as_ref()).ignore();

        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = result {
            warn!(error = %e, "Redis publish failed, dropping connection");
            *self.conn.lock().await = None;
            return Err(SinkError::Redis(format!("Publish failed: {}", e)));
        }

        debug!(channel, bytes = raster.png.len(), "Published raster to Redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_paths() {
        let sink = FileSink::new("/data/aqi");
        assert_eq!(sink.png_path("image"), PathBuf::from("/data/aqi/image.png"));
        assert_eq!(sink.metadata_path("image"), PathBuf::from("/data/aqi/image.json"));
        assert_eq!(sink.describe(), "file:///data/aqi");
    }

    #[test]
    fn test_redis_sink_rejects_bad_url() {
        assert!(matches!(RedisSink::new("not a url"), Err(SinkError::Redis(_))));
    }
}
