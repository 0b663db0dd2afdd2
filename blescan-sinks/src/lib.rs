//! Forwarding destinations for decoded [`blescan_domain::Measurement`]s.
//! The gateway core never forwards to MQTT/HTTP/a database itself (§1
//! Non-goals); it only needs somewhere to hand a batch of measurements
//! once it has them, which is exactly the seam [`sink::MeasurementSink`]
//! provides.

pub mod sink;

pub use sink::{JsonLinesSink, MeasurementSink, NoopSink, SinkError};
