use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use blescan_domain::Measurement;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SessionError;
use crate::session::Session;

/// Binds an open [`Session`] to the BT510 wire protocol (§4.9): the
/// JSON-RPC method table of §4.6, typed configuration get/set, and the
/// prepare/read/ack log-download loop. Holds no connection state of its
/// own — everything it does is a `request` (or a sequence of them) through
/// the session it wraps.
pub struct Bt510Sensor {
    session: Arc<Session>,
    max_log_entries_per_request: u32,
}

/// Decision returned by the caller-supplied batch callback in
/// [`Bt510Sensor::download_log`]: whether the sensor may forget the
/// entries it just sent.
pub type AckDecision = bool;

impl Bt510Sensor {
    #[must_use]
    pub fn new(session: Arc<Session>, max_log_entries_per_request: u32) -> Self {
        Bt510Sensor {
            session,
            max_log_entries_per_request,
        }
    }

    /// `get` (§4.6): requests the named properties and returns them as a
    /// mapping, honoring the flattened-vs-canonical response rules of
    /// §4.7 via [`blescan_rpc::typed`].
    pub async fn get_configuration(
        &self,
        properties: &[&str],
        deadline: Duration,
    ) -> Result<Option<Map<String, Value>>, SessionError> {
        let response = self
            .session
            .request_with_retry("get", serde_json::json!(properties), deadline)
            .await?;
        Ok(response.get_result_mapping())
    }

    /// `set` (§4.6): pushes a property→value mapping and reports whether
    /// the sensor acknowledged it (the literal string `"ok"` coerces to
    /// `true` per §4.7's boolean typing rule).
    pub async fn set_configuration(
        &self,
        properties: Map<String, Value>,
        deadline: Duration,
    ) -> Result<bool, SessionError> {
        let response = self
            .session
            .request_with_retry("set", Value::Object(properties), deadline)
            .await?;
        Ok(response.get_result_typed::<bool>())
    }

    /// `dump` (§4.6): opaque diagnostic payload, returned as-is.
    pub async fn dump(&self, deadline: Duration) -> Result<Value, SessionError> {
        let response = self.session.request_with_retry("dump", Value::Null, deadline).await?;
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Runs the full log-download flow of §4.6: `prepareLog`, then a loop
    /// of `readLog(N)`/decode/callback/`ackLog(N)` bounded by
    /// `max_log_entries_per_request`, stopping once the sensor reports no
    /// more events are available. `on_batch` receives each batch's decoded
    /// measurements and returns whether the sensor may drop them; only a
    /// confirmed batch is acknowledged, so a callback that returns `false`
    /// (e.g. the forwarding sink is unreachable) leaves those entries on
    /// the device for a future retry.
    pub async fn download_log(
        &self,
        deadline: Duration,
        mut on_batch: impl FnMut(&[Measurement]) -> AckDecision,
    ) -> Result<usize, SessionError> {
        let prepared = self
            .session
            .request_with_retry("prepareLog", Value::from(0), deadline)
            .await?;
        let mut remaining: u32 = prepared.get_result_typed();
        let mut total = 0usize;

        while remaining > 0 {
            let batch = remaining.min(self.max_log_entries_per_request);
            let response = self
                .session
                .request_with_retry("readLog", Value::from(batch), deadline)
                .await?;
            let encoded: String = response.get_result_typed();
            let raw = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| SessionError::ProtocolError(format!("readLog result was not valid base64: {e}")))?;

            let entries = blescan_bt510::parse_log(&raw);
            total += entries.len();

            if on_batch(&entries) {
                self.session
                    .request_with_retry("ackLog", Value::from(batch), deadline)
                    .await?;
            } else {
                debug!(address = %self.session.address(), batch, "batch not acknowledged, leaving entries on device");
            }

            remaining -= batch;
        }

        Ok(total)
    }

    /// Decodes a measurement directly from an advertisement's
    /// manufacturer-data map, with no connection involved (§4.8). A free
    /// function rather than a method since it needs no open session.
    #[must_use]
    pub fn parse_advertisement(
        manufacturer_data: &HashMap<u16, Vec<u8>>,
        captured_at: DateTime<Utc>,
    ) -> Option<Measurement> {
        blescan_bt510::parse_advertisement(manufacturer_data, captured_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapterBuilder;
    use crate::config::Bt510Config;
    use crate::session::SessionParams;
    use crate::token::BtManager;
    use blescan_domain::{Address, MeasurementKind};
    use tokio_util::sync::CancellationToken;

    fn test_params() -> SessionParams {
        SessionParams {
            connection_attempts: 3,
            retry_delay: Duration::from_millis(1),
            retry_delay_step: Duration::from_millis(1),
            stabilization_delay: Duration::from_millis(1),
            bt510: Bt510Config {
                rpc_timeout: Duration::from_secs(1),
                max_command_retries: 3,
                mtu: 244,
                retry_delay: Duration::from_millis(1),
            },
            primary_service: *crate::uuids::PRIMARY_SERVICE_UUID,
            command_characteristic: *crate::uuids::COMMAND_CHARACTERISTIC_UUID,
            response_characteristic: *crate::uuids::RESPONSE_CHARACTERISTIC_UUID,
        }
    }

    async fn open_sensor(responses: Vec<Vec<u8>>) -> Bt510Sensor {
        let address = Address::from_bytes([3, 3, 3, 3, 3, 3]);
        let adapter = FakeAdapterBuilder::new()
            .with_scripted_response(address, responses)
            .build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Arc::new(Session::new(device, token, test_params()));
        session.open().await.unwrap();
        Bt510Sensor::new(session, 128)
    }

    #[tokio::test]
    async fn get_configuration_returns_flattened_properties() {
        let response = br#"{"jsonrpc":"2.0","id":1,"mtu":244,"sensorName":"3CPO-42","result":"ok"}"#.to_vec();
        let sensor = open_sensor(vec![response]).await;

        let mapping = sensor
            .get_configuration(&["mtu", "sensorName"], Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping["mtu"], Value::from(244));
        assert_eq!(mapping["sensorName"], Value::from("3CPO-42"));
    }

    #[tokio::test]
    async fn set_configuration_ok_result_is_true() {
        let response = br#"{"jsonrpc":"2.0","id":1,"result":"ok"}"#.to_vec();
        let sensor = open_sensor(vec![response]).await;

        let mut properties = Map::new();
        properties.insert("epoch".to_string(), Value::from(1));
        let ok = sensor.set_configuration(properties, Duration::from_secs(1)).await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn download_log_decodes_and_acks_a_single_batch() {
        // A single temperature entry: epoch 1575403321, raw 2275, event 1.
        let entry: [u8; 8] = [0x39, 0xBF, 0xE6, 0x5D, 0xE3, 0x08, 0x01, 0x00];
        let encoded = base64::engine::general_purpose::STANDARD.encode(entry);

        let prepare_response = br#"{"jsonrpc":"2.0","id":1,"result":1}"#.to_vec();
        let read_response = format!(r#"{{"jsonrpc":"2.0","id":2,"result":"{encoded}"}}"#).into_bytes();
        let ack_response = br#"{"jsonrpc":"2.0","id":3,"result":1}"#.to_vec();

        let sensor = open_sensor(vec![prepare_response, read_response, ack_response]).await;

        let mut seen = Vec::new();
        let total = sensor
            .download_log(Duration::from_secs(1), |batch| {
                seen.extend(batch.iter().cloned());
                true
            })
            .await
            .unwrap();

        assert_eq!(total, 1);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, MeasurementKind::Temperature);
    }

    #[tokio::test]
    async fn download_log_skips_ack_when_callback_declines() {
        let entry: [u8; 8] = [0x39, 0xBF, 0xE6, 0x5D, 0xE3, 0x08, 0x01, 0x00];
        let encoded = base64::engine::general_purpose::STANDARD.encode(entry);

        let prepare_response = br#"{"jsonrpc":"2.0","id":1,"result":1}"#.to_vec();
        let read_response = format!(r#"{{"jsonrpc":"2.0","id":2,"result":"{encoded}"}}"#).into_bytes();

        // Only two scripted responses: if the sensor tried to send ackLog
        // anyway, awaiting its response would time out and fail the test.
        let sensor = open_sensor(vec![prepare_response, read_response]).await;

        let total = sensor
            .download_log(Duration::from_millis(200), |_batch| false)
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn parse_advertisement_delegates_to_the_bt510_codec() {
        let mut data = HashMap::new();
        let mut payload = vec![0u8; 22];
        payload[19] = 1;
        payload[20..22].copy_from_slice(&2550i16.to_le_bytes());
        data.insert(blescan_domain::BT510_COMPANY_ID, payload);

        let measurement = Bt510Sensor::parse_advertisement(&data, Utc::now()).unwrap();
        assert_eq!(measurement.kind, MeasurementKind::Temperature);
    }
}
