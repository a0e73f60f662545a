//! Test data generators for observations and scalar fields.
//!
//! Random generators take an explicit seed so failures reproduce.

use aqi_common::{BoundingBox, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Creates `count` observations scattered uniformly inside `bbox`.
///
/// Values are drawn from `[0, 300)` and every observation uses `radius`.
///
/// # Example
///
/// ```
/// use aqi_common::BoundingBox;
/// use test_utils::random_observations;
///
/// let bbox = BoundingBox::new(23.7, 37.8, 23.8, 37.9);
/// let obs = random_observations(25, &bbox, 0.02, 7);
/// assert_eq!(obs.len(), 25);
/// assert!(obs.iter().all(|o| bbox.contains_point(o.latitude, o.longitude)));
/// ```
pub fn random_observations(
    count: usize,
    bbox: &BoundingBox,
    radius: f64,
    seed: u64,
) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let latitude = bbox.south + rng.gen::<f64>() * bbox.height();
            let longitude = bbox.west + rng.gen::<f64>() * bbox.width();
            let value = rng.gen_range(0.0..300.0);
            Observation::new(latitude, longitude, value, radius).with_source(format!("gen_{i}"))
        })
        .collect()
}

/// Creates observations placed exactly on a regular lattice inside `bbox`.
///
/// Useful when a test needs observations to coincide with grid cells.
pub fn lattice_observations(
    bbox: &BoundingBox,
    rows: usize,
    cols: usize,
    value: f64,
    radius: f64,
) -> Vec<Observation> {
    let mut out = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let latitude = bbox.south + (row as f64 + 0.5) * bbox.height() / rows.max(1) as f64;
            let longitude = bbox.west + (col as f64 + 0.5) * bbox.width() / cols.max(1) as f64;
            out.push(
                Observation::new(latitude, longitude, value, radius)
                    .with_source(format!("lattice_{row}_{col}")),
            );
        }
    }
    out
}

/// Creates a field ramping linearly from `min` (first cell) to `max`
/// (last cell) in row-major order.
///
/// # Example
///
/// ```
/// use test_utils::create_aqi_ramp;
///
/// let field = create_aqi_ramp(10, 5, 0.0, 490.0);
/// assert_eq!(field.len(), 50);
/// assert_eq!(field[0], 0.0);
/// assert_eq!(field[49], 490.0);
/// ```
pub fn create_aqi_ramp(width: usize, height: usize, min: f64, max: f64) -> Vec<f64> {
    let n = width * height;
    let span = (n.max(2) - 1) as f64;
    (0..n).map(|i| min + (max - min) * i as f64 / span).collect()
}

/// Creates a field of a single value.
pub fn create_constant_field(width: usize, height: usize, value: f64) -> Vec<f64> {
    vec![value; width * height]
}

/// Creates a field with NaN at the specified row-major indices.
pub fn create_field_with_nans(
    width: usize,
    height: usize,
    value: f64,
    nan_indices: &[usize],
) -> Vec<f64> {
    let mut field = create_constant_field(width, height, value);
    for &i in nan_indices {
        if i < field.len() {
            field[i] = f64::NAN;
        }
    }
    field
}
