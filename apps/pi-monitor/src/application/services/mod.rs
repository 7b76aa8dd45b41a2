//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `MetricProducer`: samples one metric and publishes it on an interval
//! - `ProducerSet`: the fixed set of producers started at boot

mod producer;

pub use producer::{
    MetricProducer, ProducerConfig, ProducerSet, ProducerState, ProducerStatus, SampleError,
};
