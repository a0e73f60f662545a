//! Regular latitude/longitude evaluation grids.
//!
//! A [`Grid`] is pure data: the ordered latitude and longitude cell
//! centers spanning a bounding box. Values that live on the grid are stored
//! row-major with row 0 at the southern edge.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, GridError};

/// Relative tolerance used when deciding whether an extent is an exact
/// multiple of the step.
const STEP_TOLERANCE: f64 = 1e-9;

/// How the longitude step relates to the latitude resolution.
///
/// A degree of longitude spans less ground than a degree of latitude away
/// from the equator, so the longitude step is usually the larger of the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LongitudeStep {
    /// Same step in both axes.
    Same,
    /// Longitude step is `resolution * factor`.
    Factor { factor: f64 },
    /// Longitude step is `resolution / cos(mid-latitude)`.
    Compensated,
}

impl Default for LongitudeStep {
    fn default() -> Self {
        LongitudeStep::Same
    }
}

/// Builds a [`Grid`] for a bounding box at a given resolution.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    bbox: BoundingBox,
    resolution: f64,
    longitude_step: LongitudeStep,
}

impl GridBuilder {
    /// Start a builder; the longitude step defaults to [`LongitudeStep::Same`].
    pub fn new(bbox: BoundingBox, resolution: f64) -> Self {
        Self {
            bbox,
            resolution,
            longitude_step: LongitudeStep::Same,
        }
    }

    pub fn longitude_step(mut self, step: LongitudeStep) -> Self {
        self.longitude_step = step;
        self
    }

    /// Resolve the longitude step in degrees.
    pub fn lon_step(&self) -> Result<f64, GridError> {
        let step = match self.longitude_step {
            LongitudeStep::Same => self.resolution,
            LongitudeStep::Factor { factor } => self.resolution * factor,
            LongitudeStep::Compensated => {
                let (mid_lat, _) = self.bbox.center();
                self.resolution / mid_lat.to_radians().cos()
            }
        };

        if !(step.is_finite() && step > 0.0) {
            return Err(GridError::InvalidLongitudeStep(step));
        }
        Ok(step)
    }

    /// Build the grid. A zero-area box yields an empty grid.
    pub fn build(&self) -> Result<Grid, GridError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(GridError::InvalidResolution(self.resolution));
        }
        let lon_step = self.lon_step()?;

        let latitudes = axis(self.bbox.south, self.bbox.north, self.resolution);
        let longitudes = axis(self.bbox.west, self.bbox.east, lon_step);

        Ok(Grid {
            bbox: self.bbox,
            lat_step: self.resolution,
            lon_step,
            latitudes,
            longitudes,
        })
    }
}

/// Cell centers from `start` (inclusive) towards `end` (exclusive).
///
/// Coordinates are computed as `start + i * step` so long axes do not
/// accumulate rounding drift.
pub fn axis(start: f64, end: f64, step: f64) -> Vec<f64> {
    let count = axis_len(end - start, step);
    (0..count).map(|i| start + i as f64 * step).collect()
}

fn axis_len(extent: f64, step: f64) -> usize {
    if !(extent > 0.0 && step > 0.0) {
        return 0;
    }
    let n = extent / step;
    if !n.is_finite() {
        return 0;
    }
    let rounded = n.round();
    if (n - rounded).abs() <= STEP_TOLERANCE * rounded.max(1.0) {
        rounded as usize
    } else {
        n.ceil() as usize
    }
}

/// A regular lat/lon grid of cell centers.
#[derive(Debug, Clone)]
pub struct Grid {
    bbox: BoundingBox,
    lat_step: f64,
    lon_step: f64,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
}

impl Grid {
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Latitude centers, south to north.
    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    /// Longitude centers, west to east.
    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn lat_step(&self) -> f64 {
        self.lat_step
    }

    pub fn lon_step(&self) -> f64 {
        self.lon_step
    }

    /// Number of columns (longitude points).
    pub fn nx(&self) -> usize {
        self.longitudes.len()
    }

    /// Number of rows (latitude points).
    pub fn ny(&self) -> usize {
        self.latitudes.len()
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.nx() * self.ny()
    }

    pub fn is_empty(&self) -> bool {
        self.nx() == 0 || self.ny() == 0
    }

    /// Row-major index of a cell.
    #[inline]
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.nx() + col
    }

    /// Coordinates of a cell, if the indices are inside the grid.
    pub fn cell(&self, row: usize, col: usize) -> Option<GridPoint> {
        Some(GridPoint {
            latitude: *self.latitudes.get(row)?,
            longitude: *self.longitudes.get(col)?,
            row,
            col,
        })
    }

    /// Iterate every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = GridPoint> + '_ {
        self.latitudes.iter().enumerate().flat_map(move |(row, &latitude)| {
            self.longitudes
                .iter()
                .enumerate()
                .map(move |(col, &longitude)| GridPoint {
                    latitude,
                    longitude,
                    row,
                    col,
                })
        })
    }

    /// The `(row, col)` of the cell whose center is nearest to a point.
    pub fn nearest_cell(&self, latitude: f64, longitude: f64) -> Option<(usize, usize)> {
        if self.is_empty() {
            return None;
        }

        let row = ((latitude - self.latitudes[0]) / self.lat_step).round();
        let col = ((longitude - self.longitudes[0]) / self.lon_step).round();

        if row < 0.0 || col < 0.0 || row >= self.ny() as f64 || col >= self.nx() as f64 {
            return None;
        }

        Some((row as usize, col as usize))
    }

    /// Rows whose latitude center lies within `[lo, hi]`.
    pub fn row_span(&self, lo: f64, hi: f64) -> Range<usize> {
        span(self.latitudes.first().copied(), self.lat_step, self.ny(), lo, hi)
    }

    /// Columns whose longitude center lies within `[lo, hi]`.
    pub fn col_span(&self, lo: f64, hi: f64) -> Range<usize> {
        span(self.longitudes.first().copied(), self.lon_step, self.nx(), lo, hi)
    }
}

fn span(first: Option<f64>, step: f64, n: usize, lo: f64, hi: f64) -> Range<usize> {
    let Some(first) = first else {
        return 0..0;
    };
    if !(lo <= hi) {
        return 0..0;
    }

    let start = ((lo - first) / step).ceil().max(0.0).min(n as f64) as usize;
    let end = (((hi - first) / step).floor() + 1.0).max(0.0).min(n as f64) as usize;

    if start >= end {
        0..0
    } else {
        start..end
    }
}

/// A cell center with its indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub row: usize,
    pub col: usize,
}
