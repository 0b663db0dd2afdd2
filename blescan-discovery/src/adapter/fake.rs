//! An in-memory `BtAdapter`/`BtDevice` double for exercising the scanner,
//! token pool, and session manager without real hardware. Scripted the
//! same way the teacher's own components are driven in their unit tests:
//! construct with a fixed set of advertisements, then call into the
//! gateway and assert on what it produced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blescan_domain::Address;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::{AdvertisedDevice, BtAdapter, BtDevice};
use crate::buffer::Buffer;
use crate::error::AdapterError;

#[derive(Default)]
pub struct FakeAdapterBuilder {
    advertisements: Vec<AdvertisedDevice>,
    scripted_responses: HashMap<Address, Vec<Vec<u8>>>,
    connect_failures: Vec<Address>,
    write_failures: HashMap<Address, usize>,
    missing_services: Vec<Address>,
}

impl FakeAdapterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_advertisement(mut self, device: AdvertisedDevice) -> Self {
        self.advertisements.push(device);
        self
    }

    /// Queues response payloads for `address`'s device: each successful
    /// `write_without_response` call appends the next one to the
    /// notification buffer, simulating the device's reply arriving after
    /// the caller's request. Assumes one write per request, true for any
    /// JSON-RPC payload under the configured MTU.
    #[must_use]
    pub fn with_scripted_response(mut self, address: Address, fragments: Vec<Vec<u8>>) -> Self {
        self.scripted_responses.insert(address, fragments);
        self
    }

    #[must_use]
    pub fn with_connect_failure(mut self, address: Address) -> Self {
        self.connect_failures.push(address);
        self
    }

    /// The device's first `count` writes fail with an adapter error before
    /// any later write (or scripted response delivery) succeeds.
    #[must_use]
    pub fn with_write_failures(mut self, address: Address, count: usize) -> Self {
        self.write_failures.insert(address, count);
        self
    }

    /// `has_service` reports the primary service as absent for this
    /// address, regardless of which UUID is queried.
    #[must_use]
    pub fn with_missing_service(mut self, address: Address) -> Self {
        self.missing_services.push(address);
        self
    }

    #[must_use]
    pub fn build(self) -> FakeAdapter {
        FakeAdapter {
            advertisements: self.advertisements,
            scripted_responses: self.scripted_responses,
            connect_failures: self.connect_failures,
            write_failures: self.write_failures,
            missing_services: self.missing_services,
            devices: DashMap::new(),
            written: Arc::new(AsyncMutex::new(Vec::new())),
        }
    }
}

pub struct FakeAdapter {
    advertisements: Vec<AdvertisedDevice>,
    scripted_responses: HashMap<Address, Vec<Vec<u8>>>,
    connect_failures: Vec<Address>,
    write_failures: HashMap<Address, usize>,
    missing_services: Vec<Address>,
    devices: DashMap<Address, Arc<FakeDevice>>,
    written: Arc<AsyncMutex<Vec<(Address, Vec<u8>)>>>,
}

impl FakeAdapter {
    /// Everything written via `write_without_response` across every
    /// device this adapter has handed out, in call order.
    pub async fn written_bytes(&self) -> Vec<(Address, Vec<u8>)> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl BtAdapter for FakeAdapter {
    async fn power_on(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn advertised_devices(&self) -> Result<Vec<AdvertisedDevice>, AdapterError> {
        Ok(self.advertisements.clone())
    }

    async fn device(&self, address: Address) -> Result<Arc<dyn BtDevice>, AdapterError> {
        if let Some(existing) = self.devices.get(&address) {
            return Ok(existing.value().clone());
        }
        let device = Arc::new(FakeDevice {
            address,
            should_fail_connect: self.connect_failures.contains(&address),
            missing_service: self.missing_services.contains(&address),
            fragments: self.scripted_responses.get(&address).cloned().unwrap_or_default(),
            next_fragment: AsyncMutex::new(0),
            writes_to_fail: AsyncMutex::new(self.write_failures.get(&address).copied().unwrap_or(0)),
            buffer: AsyncMutex::new(None),
            written: self.written.clone(),
        });
        self.devices.insert(address, device.clone());
        Ok(device)
    }
}

struct FakeDevice {
    address: Address,
    should_fail_connect: bool,
    missing_service: bool,
    fragments: Vec<Vec<u8>>,
    next_fragment: AsyncMutex<usize>,
    writes_to_fail: AsyncMutex<usize>,
    buffer: AsyncMutex<Option<Arc<Buffer>>>,
    written: Arc<AsyncMutex<Vec<(Address, Vec<u8>)>>>,
}

#[async_trait]
impl BtDevice for FakeDevice {
    fn address(&self) -> Address {
        self.address
    }

    async fn connect(&self, _timeout: Duration) -> Result<(), AdapterError> {
        if self.should_fail_connect {
            return Err(AdapterError::Timeout);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, AdapterError> {
        Ok(true)
    }

    async fn discover_services(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn has_service(&self, _uuid: Uuid) -> Result<bool, AdapterError> {
        Ok(!self.missing_service)
    }

    async fn has_characteristic(&self, _uuid: Uuid) -> Result<bool, AdapterError> {
        Ok(true)
    }

    async fn subscribe_notifications(
        &self,
        _characteristic_uuid: Uuid,
        buffer: Arc<Buffer>,
    ) -> Result<(), AdapterError> {
        *self.buffer.lock().await = Some(buffer);
        Ok(())
    }

    async fn write_without_response(
        &self,
        _characteristic_uuid: Uuid,
        bytes: &[u8],
    ) -> Result<(), AdapterError> {
        let mut remaining_failures = self.writes_to_fail.lock().await;
        if *remaining_failures > 0 {
            *remaining_failures -= 1;
            return Err(AdapterError::Io("scripted write failure".to_string()));
        }
        drop(remaining_failures);

        self.written.lock().await.push((self.address, bytes.to_vec()));

        let mut next = self.next_fragment.lock().await;
        if let Some(fragment) = self.fragments.get(*next) {
            if let Some(buffer) = self.buffer.lock().await.as_ref() {
                buffer.append(fragment);
            }
            *next += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advertised_devices_reflects_builder_input() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new()
            .with_advertisement(AdvertisedDevice {
                address,
                name: Some("bt510-01".to_string()),
                rssi: Some(-60),
                manufacturer_data: HashMap::new(),
            })
            .build();

        let devices = adapter.advertised_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, address);
    }

    #[tokio::test]
    async fn connect_failure_is_scripted_per_address() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new().with_connect_failure(address).build();

        let device = adapter.device(address).await.unwrap();
        assert!(device.connect(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn scripted_responses_land_in_the_buffer_one_write_at_a_time() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new()
            .with_scripted_response(address, vec![b"{\"a\":".to_vec(), b"1}".to_vec()])
            .build();

        let device = adapter.device(address).await.unwrap();
        let buffer = Arc::new(Buffer::new());
        device
            .subscribe_notifications(Uuid::nil(), buffer.clone())
            .await
            .unwrap();
        assert_eq!(buffer.snapshot(), b"");

        device.write_without_response(Uuid::nil(), b"req-1").await.unwrap();
        assert_eq!(buffer.snapshot(), b"{\"a\":");

        device.write_without_response(Uuid::nil(), b"req-2").await.unwrap();
        assert_eq!(buffer.snapshot(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn scripted_write_failures_are_exhausted_before_writes_succeed() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new().with_write_failures(address, 2).build();
        let device = adapter.device(address).await.unwrap();

        assert!(device.write_without_response(Uuid::nil(), b"one").await.is_err());
        assert!(device.write_without_response(Uuid::nil(), b"two").await.is_err());
        assert!(device.write_without_response(Uuid::nil(), b"three").await.is_ok());

        let written = adapter.written_bytes().await;
        assert_eq!(written, vec![(address, b"three".to_vec())]);
    }

    #[tokio::test]
    async fn missing_service_is_scripted_per_address() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new().with_missing_service(address).build();
        let device = adapter.device(address).await.unwrap();

        assert!(!device.has_service(Uuid::nil()).await.unwrap());
    }

    #[tokio::test]
    async fn writes_are_recorded_per_device() {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new().build();
        let device = adapter.device(address).await.unwrap();
        device.write_without_response(Uuid::nil(), b"hello").await.unwrap();

        let written = adapter.written_bytes().await;
        assert_eq!(written, vec![(address, b"hello".to_vec())]);
    }
}
