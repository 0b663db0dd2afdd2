use std::path::Path;

use async_trait::async_trait;
use blescan_domain::{Address, Measurement};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{MeasurementSink, SinkError};

#[derive(Serialize)]
struct Record<'a> {
    address: Address,
    #[serde(flatten)]
    measurement: &'a Measurement,
}

/// Appends one JSON object per line per measurement to a file, for local
/// inspection without a database or network forwarder (§1 Non-goals keep
/// both of those out of the core).
pub struct JsonLinesSink {
    file: File,
}

impl JsonLinesSink {
    /// Opens (creating if absent, appending if present) the file at
    /// `path` as the destination for every subsequent `record` call.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(JsonLinesSink { file })
    }
}

#[async_trait]
impl MeasurementSink for JsonLinesSink {
    async fn record(&mut self, address: Address, measurements: &[Measurement]) -> Result<(), SinkError> {
        for measurement in measurements {
            let mut line = serde_json::to_vec(&Record { address, measurement })?;
            line.push(b'\n');
            self.file.write_all(&line).await?;
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.file.flush().await?;
        Ok(())
    }
}
