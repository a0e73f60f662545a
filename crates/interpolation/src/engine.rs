//! Parallel accumulation of observation contributions.

use std::ops::Range;

use aqi_common::{Grid, Observation};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{radial_decay, DistanceMetric, ScalarField};

/// Minimum cells before work is split across threads.
const PARALLEL_THRESHOLD: usize = 4096;

/// How the summation is split across threads. Both strategies produce the
/// same field up to floating-point reassociation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Partitioning {
    /// Disjoint row bands, each summing every observation into its own rows.
    Rows,
    /// Batches of observations, each accumulating a private delta field;
    /// the deltas are summed at the end.
    ObservationBatches { batch_size: usize },
}

impl Default for Partitioning {
    fn default() -> Self {
        Partitioning::Rows
    }
}

/// Grid cells an observation can reach.
#[derive(Debug, Clone)]
struct Reach {
    rows: Range<usize>,
    cols: Range<usize>,
}

/// Computes a [`ScalarField`] from observations on a [`Grid`].
#[derive(Debug, Clone)]
pub struct InterpolationEngine {
    base_value: f64,
    metric: DistanceMetric,
    partitioning: Partitioning,
}

impl InterpolationEngine {
    pub fn new(base_value: f64, metric: DistanceMetric) -> Self {
        Self {
            base_value,
            metric,
            partitioning: Partitioning::Rows,
        }
    }

    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Interpolate `observations` onto `grid`.
    ///
    /// With no observations the field is uniformly `base_value`; an empty
    /// grid yields an empty field.
    pub fn interpolate(&self, grid: &Grid, observations: &[Observation]) -> ScalarField {
        let (nx, ny) = (grid.nx(), grid.ny());
        if grid.is_empty() || observations.is_empty() {
            return ScalarField::filled(nx, ny, self.base_value);
        }

        let reaches: Vec<Reach> = observations
            .iter()
            .map(|obs| self.reach(grid, obs))
            .collect();

        let values = match self.partitioning {
            Partitioning::Rows => self.by_rows(grid, observations, &reaches),
            Partitioning::ObservationBatches { batch_size } => {
                self.by_batches(grid, observations, &reaches, batch_size.max(1))
            }
        };

        debug!(
            cells = grid.len(),
            observations = observations.len(),
            metric = self.metric.as_str(),
            partitioning = ?self.partitioning,
            "Interpolated field"
        );

        ScalarField::from_values(nx, ny, values)
            .unwrap_or_else(|| ScalarField::filled(nx, ny, self.base_value))
    }

    fn reach(&self, grid: &Grid, obs: &Observation) -> Reach {
        let (dlat, dlon) = self.metric.reach(obs.latitude, obs.radius);
        // one cell of slack keeps rounding at the window edge harmless
        let dlat = dlat + grid.lat_step();
        let dlon = dlon + grid.lon_step();
        Reach {
            rows: grid.row_span(obs.latitude - dlat, obs.latitude + dlat),
            cols: grid.col_span(obs.longitude - dlon, obs.longitude + dlon),
        }
    }

    /// Add the contributions of `obs` to the rows `first_row..` held in `out`.
    fn accumulate(
        &self,
        grid: &Grid,
        obs: &Observation,
        reach: &Reach,
        first_row: usize,
        out: &mut [f64],
    ) {
        let nx = grid.nx();
        let last_row = first_row + out.len() / nx;
        let rows = reach.rows.start.max(first_row)..reach.rows.end.min(last_row);
        let delta = obs.value - self.base_value;

        for row in rows {
            let latitude = grid.latitudes()[row];
            let offset = (row - first_row) * nx;
            for col in reach.cols.clone() {
                let longitude = grid.longitudes()[col];
                let d = self
                    .metric
                    .distance(latitude, longitude, obs.latitude, obs.longitude);
                let weight = radial_decay(d, obs.radius);
                if weight > 0.0 {
                    out[offset + col] += weight * delta;
                }
            }
        }
    }

    fn by_rows(&self, grid: &Grid, observations: &[Observation], reaches: &[Reach]) -> Vec<f64> {
        let nx = grid.nx();
        let mut values = vec![self.base_value; grid.len()];

        let band_rows = if grid.len() < PARALLEL_THRESHOLD {
            grid.ny()
        } else {
            (grid.ny() / (rayon::current_num_threads() * 4)).max(1)
        };

        values
            .par_chunks_mut(band_rows * nx)
            .enumerate()
            .for_each(|(band, out)| {
                let first_row = band * band_rows;
                for (obs, reach) in observations.iter().zip(reaches) {
                    self.accumulate(grid, obs, reach, first_row, out);
                }
            });

        values
    }

    fn by_batches(
        &self,
        grid: &Grid,
        observations: &[Observation],
        reaches: &[Reach],
        batch_size: usize,
    ) -> Vec<f64> {
        let len = grid.len();

        let delta = observations
            .par_chunks(batch_size)
            .zip(reaches.par_chunks(batch_size))
            .fold(
                || vec![0.0; len],
                |mut acc, (batch, batch_reaches)| {
                    for (obs, reach) in batch.iter().zip(batch_reaches) {
                        self.accumulate(grid, obs, reach, 0, &mut acc);
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0; len],
                |mut a, b| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        delta.into_iter().map(|d| self.base_value + d).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_common::{BoundingBox, GridBuilder};

    #[test]
    fn test_reach_is_clamped_to_grid() {
        let grid = GridBuilder::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.1)
            .build()
            .unwrap();
        let engine = InterpolationEngine::new(10.0, DistanceMetric::Planar);
        let reach = engine.reach(&grid, &Observation::new(0.0, 0.0, 50.0, 0.15));
        assert_eq!(reach.rows, 0..3);
        assert_eq!(reach.cols, 0..3);
    }

    #[test]
    fn test_zero_batch_size_is_treated_as_one() {
        let grid = GridBuilder::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.1)
            .build()
            .unwrap();
        let obs = vec![Observation::new(0.5, 0.5, 50.0, 0.3)];
        let engine = InterpolationEngine::new(10.0, DistanceMetric::Planar)
            .with_partitioning(Partitioning::ObservationBatches { batch_size: 0 });
        let field = engine.interpolate(&grid, &obs);
        assert_eq!(field.get(5, 5), Some(50.0));
    }
}
