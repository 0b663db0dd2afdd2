use async_trait::async_trait;
use blescan_domain::{Address, Measurement};

use super::{MeasurementSink, SinkError};

/// Discards every measurement handed to it. The default sink when no
/// forwarding destination is configured.
#[derive(Default)]
pub struct NoopSink;

#[async_trait]
impl MeasurementSink for NoopSink {
    async fn record(&mut self, _address: Address, _measurements: &[Measurement]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn recording_and_closing_never_fail() {
        let mut sink = NoopSink;
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let measurement = Measurement::temperature(21.0, blescan_domain::Origin::Log, Utc::now());
        sink.record(address, &[measurement]).await.unwrap();
        Box::new(sink).close().await.unwrap();
    }
}
