//! AQI heat-map publisher.
//!
//! Periodically fetches observations from the configured sources, converts
//! them to AQI, interpolates them onto the region grid, renders the field
//! as a PNG and publishes it to the configured sink.
//!
//! - [`config`]: YAML configuration
//! - [`source`]: upstream observation sources
//! - [`pipeline`]: conversion, interpolation and rendering
//! - [`sink`]: publish targets
//! - [`scheduler`]: the periodic cycle
//! - [`server`]: status API

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod sink;
pub mod source;

pub use config::PublisherConfig;
pub use scheduler::{CycleFailure, CycleReport, Scheduler, SchedulerStatus, StatusHandle};
pub use sink::{FileSink, PublishSink, RedisSink, SinkError};
pub use source::{
    CompositeSource, FetchSettings, FetchedObservations, FileSource, HttpSource,
    ObservationSource, SourceError,
};
