//! Grid-shaped scalar values.

use serde::{Deserialize, Serialize};

/// A row-major `f64` field, `width` columns by `height` rows, row 0 at the
/// southern edge of the grid it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

/// Summary statistics over the finite cells of a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ScalarField {
    /// A field with every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    /// Wrap existing values; `None` if the length does not match.
    pub fn from_values(width: usize, height: usize, values: Vec<f64>) -> Option<Self> {
        (values.len() == width * height).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.values.get(row * self.width + col).copied()
    }

    /// Row slices from south to north.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.width.max(1))
    }

    /// Min, max and mean of finite cells; `None` if there are none.
    pub fn stats(&self) -> Option<FieldStats> {
        let (min, max, sum, count) = self
            .values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize), |(min, max, sum, n), &v| {
                (min.min(v), max.max(v), sum + v, n + 1)
            });

        (count > 0).then(|| FieldStats {
            min,
            max,
            mean: sum / count as f64,
        })
    }
}
