//! Prometheus metrics for the publish cycle.

use std::time::Instant;

use aqi_common::CycleStage;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register descriptions so the exporter emits `# HELP` lines.
pub fn describe() {
    describe_counter!("publisher_cycles_total", "Refresh cycles by outcome");
    describe_counter!(
        "publisher_records_rejected_total",
        "Upstream records dropped during mapping or conversion"
    );
    describe_counter!("publisher_source_failures_total", "Failed source fetches");
    describe_gauge!(
        "publisher_source_observations",
        "Observations mapped from each source in the last fetch"
    );
    describe_gauge!(
        "publisher_observations",
        "Observations used by the last completed interpolation"
    );
    describe_gauge!(
        "publisher_last_success_timestamp_seconds",
        "Unix time of the last published raster"
    );
    describe_histogram!("publisher_stage_duration_ms", "Duration of each cycle stage");
    describe_histogram!("publisher_cycle_duration_ms", "Duration of whole cycles");
}

/// Record the end of a cycle; `outcome` is `success` or a failure kind.
pub fn record_cycle(outcome: &'static str, duration_ms: f64) {
    counter!("publisher_cycles_total", "outcome" => outcome).increment(1);
    histogram!("publisher_cycle_duration_ms").record(duration_ms);
}

pub fn record_stage(stage: CycleStage, duration_ms: f64) {
    histogram!("publisher_stage_duration_ms", "stage" => stage.as_str()).record(duration_ms);
}

pub fn record_source(source: &str, observations: usize, rejected: usize) {
    counter!("publisher_records_rejected_total", "source" => source.to_string())
        .increment(rejected as u64);
    gauge!("publisher_source_observations", "source" => source.to_string())
        .set(observations as f64);
}

pub fn record_source_failure(source: &str) {
    counter!("publisher_source_failures_total", "source" => source.to_string()).increment(1);
}

pub fn record_observations(count: usize, rejected: usize) {
    gauge!("publisher_observations").set(count as f64);
    if rejected > 0 {
        counter!("publisher_records_rejected_total", "source" => "conversion").increment(rejected as u64);
    }
}

pub fn record_success(unix_seconds: i64) {
    gauge!("publisher_last_success_timestamp_seconds").set(unix_seconds as f64);
}

/// Simple timer for measuring stage durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_micros() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_every_recorded_metric_has_help() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            record_cycle("success", 12.0);
            record_stage(CycleStage::Fetching, 3.0);
            record_source("stations", 3, 1);
            record_source_failure("cars");
            record_observations(3, 1);
            record_success(1_700_000_000);
        });

        let rendered = handle.render();
        for name in [
            "publisher_cycles_total",
            "publisher_cycle_duration_ms",
            "publisher_stage_duration_ms",
            "publisher_records_rejected_total",
            "publisher_source_observations",
            "publisher_source_failures_total",
            "publisher_observations",
            "publisher_last_success_timestamp_seconds",
        ] {
            assert!(
                rendered.contains(&format!("# HELP {} ", name)),
                "missing HELP for {}:\n{}",
                name,
                rendered
            );
        }
    }
}
