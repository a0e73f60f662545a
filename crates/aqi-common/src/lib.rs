//! Common types shared across the AQI field publisher crates.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod mapping;
pub mod observation;

pub use bbox::BoundingBox;
pub use error::{CycleError, CycleResult, CycleStage, GridError, ValidationError};
pub use grid::{Grid, GridBuilder, GridPoint, LongitudeStep};
pub use mapping::{KeyPath, MappedBatch, MappingContext, PayloadMapping, RecordMapping, ValueMapping};
pub use observation::{Observation, ObservationClass, ObservationValue, RawObservation};
