//! Network speed measurement.
//!
//! A run measures latency and jitter, then download and upload throughput,
//! against an HTTP speed test server. [`engine::SpeedTest`] drives the run
//! as a cancelable phase state machine and publishes its
//! [`engine::MeasurementState`] to subscribers.

pub mod client;
pub mod display;
pub mod engine;
pub mod errors;
pub mod measurements;
pub mod results;
pub mod stats;
