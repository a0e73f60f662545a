//! Periodic publish scheduler.
//!
//! One cycle walks `Idle → Fetching → Converting → Building → Interpolating
//! → Rendering → Publishing → Idle`. A failure at any stage returns the
//! scheduler to `Idle` without publishing; the next tick starts over with a
//! fresh fetch, so the last good raster stays in place meanwhile.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use aqi_common::{CycleError, CycleStage};
use aqi_index::AqiConverter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::metrics::{self, Timer};
use crate::pipeline::{self, CycleStamp};
use crate::sink::PublishSink;
use crate::source::{FetchSettings, ObservationSource};

const STAGES: [CycleStage; 7] = [
    CycleStage::Idle,
    CycleStage::Fetching,
    CycleStage::Converting,
    CycleStage::Building,
    CycleStage::Interpolating,
    CycleStage::Rendering,
    CycleStage::Publishing,
];

/// Summary of a successful cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub channel: String,
    pub observations: usize,
    /// Records dropped during mapping and conversion.
    pub rejected: usize,
    /// Sources that failed but were tolerated.
    pub failed_sources: Vec<String>,
    pub width: usize,
    pub height: usize,
    pub bytes: usize,
}

/// Summary of a failed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleFailure {
    pub cycle_id: Uuid,
    pub at: DateTime<Utc>,
    pub stage: CycleStage,
    pub kind: &'static str,
    pub message: String,
}

/// Snapshot served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub stage: CycleStage,
    pub channel: String,
    pub sink: String,
    pub interval_secs: u64,
    pub started_at: DateTime<Utc>,
    pub cycles_total: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<CycleReport>,
    pub last_failure: Option<CycleFailure>,
}

#[derive(Debug, Default)]
struct History {
    cycles_succeeded: u64,
    cycles_failed: u64,
    consecutive_failures: u64,
    last_success: Option<CycleReport>,
    last_failure: Option<CycleFailure>,
}

/// Shared view of scheduler progress, read by the status API while cycles
/// run.
#[derive(Debug)]
pub struct StatusHandle {
    stage: AtomicU8,
    started_at: DateTime<Utc>,
    sink: String,
    config: watch::Receiver<Arc<PublisherConfig>>,
    history: RwLock<History>,
}

impl StatusHandle {
    fn new(sink: String, config: watch::Receiver<Arc<PublisherConfig>>) -> Self {
        Self {
            stage: AtomicU8::new(0),
            started_at: Utc::now(),
            sink,
            config,
            history: RwLock::new(History::default()),
        }
    }

    pub fn stage(&self) -> CycleStage {
        STAGES
            .get(self.stage.load(Ordering::Acquire) as usize)
            .copied()
            .unwrap_or(CycleStage::Idle)
    }

    pub fn set_stage(&self, stage: CycleStage) {
        let index = STAGES.iter().position(|s| *s == stage).unwrap_or(0);
        self.stage.store(index as u8, Ordering::Release);
    }

    pub async fn snapshot(&self) -> SchedulerStatus {
        let (channel, interval_secs) = {
            let config = self.config.borrow();
            (config.sink.channel.clone(), config.schedule.interval_secs)
        };
        let history = self.history.read().await;
        SchedulerStatus {
            stage: self.stage(),
            channel,
            sink: self.sink.clone(),
            interval_secs,
            started_at: self.started_at,
            cycles_total: history.cycles_succeeded + history.cycles_failed,
            cycles_succeeded: history.cycles_succeeded,
            cycles_failed: history.cycles_failed,
            consecutive_failures: history.consecutive_failures,
            last_success: history.last_success.clone(),
            last_failure: history.last_failure.clone(),
        }
    }
}

/// Drives publish cycles against one source and one sink.
pub struct Scheduler {
    config: watch::Receiver<Arc<PublisherConfig>>,
    source: Arc<dyn ObservationSource>,
    sink: Arc<dyn PublishSink>,
    converter: AqiConverter,
    status: Arc<StatusHandle>,
}

impl Scheduler {
    /// `config` is read once at the start of every cycle; values sent while a
    /// cycle runs take effect from the next one.
    pub fn new(
        config: watch::Receiver<Arc<PublisherConfig>>,
        source: Arc<dyn ObservationSource>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        let status = Arc::new(StatusHandle::new(sink.describe(), config.clone()));
        Self {
            config,
            source,
            sink,
            converter: AqiConverter::new(),
            status,
        }
    }

    pub fn with_converter(mut self, converter: AqiConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn status_handle(&self) -> Arc<StatusHandle> {
        self.status.clone()
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.snapshot().await
    }

    /// Run one complete cycle. Errors are recorded and returned; they never
    /// leave the scheduler in a non-idle state.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let config = self.config.borrow().clone();
        let stamp = CycleStamp {
            cycle_id: Uuid::new_v4(),
            generated_at: Utc::now(),
        };
        let timer = Timer::start();

        let result = self.execute(&config, stamp, &timer).await;
        self.status.set_stage(CycleStage::Idle);

        let mut history = self.status.history.write().await;
        match &result {
            Ok(report) => {
                history.cycles_succeeded += 1;
                history.consecutive_failures = 0;
                history.last_success = Some(report.clone());
                metrics::record_cycle("success", report.duration_ms);
                metrics::record_success(report.finished_at.timestamp());
                info!(
                    cycle_id = %report.cycle_id,
                    channel = %report.channel,
                    observations = report.observations,
                    rejected = report.rejected,
                    duration_ms = report.duration_ms,
                    "Published raster"
                );
            }
            Err(e) => {
                history.cycles_failed += 1;
                history.consecutive_failures += 1;
                history.last_failure = Some(CycleFailure {
                    cycle_id: stamp.cycle_id,
                    at: Utc::now(),
                    stage: e.stage(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                metrics::record_cycle(e.kind(), timer.elapsed_ms());
                error!(
                    cycle_id = %stamp.cycle_id,
                    stage = e.stage().as_str(),
                    consecutive_failures = history.consecutive_failures,
                    error = %e,
                    "Cycle failed, nothing published"
                );
            }
        }

        result
    }

    #[instrument(skip_all, fields(cycle_id = %stamp.cycle_id))]
    async fn execute(
        &self,
        config: &Arc<PublisherConfig>,
        stamp: CycleStamp,
        timer: &Timer,
    ) -> Result<CycleReport, CycleError> {
        // === Fetch ===
        self.status.set_stage(CycleStage::Fetching);
        let stage_timer = Timer::start();
        let mut settings = FetchSettings::from_config(config);
        settings.now = stamp.generated_at;
        let fetch_timeout = config.schedule.fetch_timeout();
        let fetched = tokio::time::timeout(fetch_timeout, self.source.fetch(&settings))
            .await
            .map_err(|_| {
                CycleError::Fetch(format!("timed out after {}s", fetch_timeout.as_secs()))
            })?
            .map_err(|e| CycleError::Fetch(e.to_string()))?;
        metrics::record_stage(CycleStage::Fetching, stage_timer.elapsed_ms());

        if !fetched.failed_sources.is_empty() {
            warn!(failed = ?fetched.failed_sources, "Publishing without some sources");
        }

        // === Convert ===
        self.status.set_stage(CycleStage::Converting);
        let stage_timer = Timer::start();
        let converted = pipeline::convert(
            fetched.observations,
            &self.converter,
            config.conversion.fallback_severity,
        );
        let rejected = fetched.rejected + converted.rejected;
        metrics::record_observations(converted.observations.len(), converted.rejected);
        metrics::record_stage(CycleStage::Converting, stage_timer.elapsed_ms());

        // === Build, interpolate, render ===
        let status = self.status.clone();
        let snapshot = config.clone();
        let observations = converted.observations;
        let raster = tokio::task::spawn_blocking(move || {
            pipeline::render(&snapshot, &observations, stamp, |stage| {
                status.set_stage(stage)
            })
        })
        .await
        .map_err(|e| CycleError::Render(format!("render task failed: {}", e)))??;

        // === Publish ===
        self.status.set_stage(CycleStage::Publishing);
        let stage_timer = Timer::start();
        let channel = config.sink.channel.clone();
        let publish_timeout = config.schedule.publish_timeout();
        tokio::time::timeout(publish_timeout, self.sink.publish(&channel, &raster))
            .await
            .map_err(|_| {
                CycleError::Publish(format!("timed out after {}s", publish_timeout.as_secs()))
            })?
            .map_err(|e| CycleError::Publish(e.to_string()))?;
        metrics::record_stage(CycleStage::Publishing, stage_timer.elapsed_ms());

        Ok(CycleReport {
            cycle_id: stamp.cycle_id,
            started_at: stamp.generated_at,
            finished_at: Utc::now(),
            duration_ms: timer.elapsed_ms(),
            channel,
            observations: raster.metadata.observation_count,
            rejected,
            failed_sources: fetched.failed_sources,
            width: raster.metadata.width,
            height: raster.metadata.height,
            bytes: raster.png.len(),
        })
    }

    /// Run a cycle every configured interval until `shutdown` fires.
    ///
    /// The first cycle starts immediately. A cycle that overruns the
    /// interval causes the missed ticks to be skipped, never queued.
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut config = self.config.clone();
        let period = config.borrow().schedule.interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut watching = true;

        info!(interval_secs = period.as_secs(), "Starting publish loop");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down scheduler");
                    break;
                }
                changed = config.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let period = config.borrow_and_update().schedule.interval();
                    if period != ticker.period() {
                        ticker = tokio::time::interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        info!(interval_secs = period.as_secs(), "Publish interval changed");
                    }
                }
                _ = ticker.tick() => {
                    // failures are recorded by run_cycle; the loop carries on
                    let _ = self.run_cycle().await;
                }
            }
        }

        self.status.set_stage(CycleStage::Idle);
    }
}
