mod json_lines;
mod noop;

use async_trait::async_trait;
use blescan_domain::{Address, Measurement};

pub use json_lines::JsonLinesSink;
pub use noop::NoopSink;

/// Errors a [`MeasurementSink`] implementation can surface. Kept separate
/// from the gateway core's own error enums (§7): a sink failure is an
/// external-system problem, never a reason to fail a scan or a session.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Generalizes the teacher's `EventSink` trait to the gateway's
/// measurement-shaped data: a destination for decoded readings, with no
/// opinion on transport (MQTT, HTTP, a database) — those are out of scope
/// for the core (§1) and left to whatever concrete sink an embedder picks.
#[async_trait]
pub trait MeasurementSink: Send {
    /// Records one device's batch of measurements, in the order produced.
    async fn record(&mut self, address: Address, measurements: &[Measurement]) -> Result<(), SinkError>;

    /// Flushes and releases any resources the sink holds. Called once,
    /// when the gateway shuts down.
    async fn close(mut self: Box<Self>) -> Result<(), SinkError>;
}
