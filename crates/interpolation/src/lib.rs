//! Interpolation of sparse AQI observations onto a regular grid.
//!
//! Every observation pulls the cells around it from a base value towards
//! its own value, with a weight that falls off linearly to zero at the
//! observation's radius:
//!
//! ```text
//! field[c] = base + Σ_o decay(dist(c, o), o.radius) * (o.value - base)
//! decay(d, r) = 1 - d / r   for d < r, else 0
//! ```
//!
//! Contributions are additive and independent, so the sum is computed in
//! parallel either by row bands or by batches of observations.

pub mod decay;
pub mod engine;
pub mod field;

pub use decay::{radial_decay, DistanceMetric, EARTH_RADIUS_M};
pub use engine::{InterpolationEngine, Partitioning};
pub use field::{FieldStats, ScalarField};
