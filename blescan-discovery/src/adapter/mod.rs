//! Facade over the host Bluetooth stack (§4.3). Everything above this
//! module talks to [`BtAdapter`]/[`BtDevice`], never to `btleplug`
//! directly, so the scanner, token pool, and session manager can be
//! exercised against [`fake::FakeAdapter`] without real hardware.

mod btleplug_adapter;
#[cfg(test)]
pub mod fake;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blescan_domain::Address;
use uuid::Uuid;

pub use btleplug_adapter::BtleplugAdapter;

use crate::buffer::Buffer;
use crate::error::AdapterError;

/// A discovered or bonded peripheral's advertisement snapshot, as seen
/// during a scan cycle — before any connection is attempted.
#[derive(Debug, Clone)]
pub struct AdvertisedDevice {
    pub address: Address,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

/// The host's Bluetooth controller: discovery lifecycle and device
/// enumeration. A concrete implementation owns exactly one physical or
/// virtual adapter.
#[async_trait]
pub trait BtAdapter: Send + Sync {
    async fn power_on(&self) -> Result<(), AdapterError>;
    async fn start_discovery(&self) -> Result<(), AdapterError>;
    async fn stop_discovery(&self) -> Result<(), AdapterError>;

    /// Advertisement snapshots observed since discovery started (or since
    /// the adapter last forgot them). Does not block waiting for new
    /// devices; callers pair this with a `sleep` for the dwell time.
    async fn advertised_devices(&self) -> Result<Vec<AdvertisedDevice>, AdapterError>;

    /// Returns a connectable handle for `address`, if the adapter has
    /// seen it.
    async fn device(&self, address: Address) -> Result<Arc<dyn BtDevice>, AdapterError>;
}

/// A single peripheral, once the scanner has decided to talk to it. All
/// methods operate by GATT UUID; a concrete implementation resolves the
/// UUID against its own cached characteristic table on every call, so
/// callers never hold onto transport-specific characteristic handles.
#[async_trait]
pub trait BtDevice: Send + Sync {
    fn address(&self) -> Address;

    async fn connect(&self, timeout: Duration) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;
    async fn is_connected(&self) -> Result<bool, AdapterError>;
    async fn discover_services(&self) -> Result<(), AdapterError>;
    async fn has_service(&self, uuid: Uuid) -> Result<bool, AdapterError>;
    async fn has_characteristic(&self, uuid: Uuid) -> Result<bool, AdapterError>;

    /// Subscribes to notifications on `characteristic_uuid` and forwards
    /// every fragment into `buffer` for as long as the subscription is
    /// active. The notification handler is a producer feeding a
    /// synchronized buffer (§9); it never calls back into session or
    /// request logic directly.
    async fn subscribe_notifications(
        &self,
        characteristic_uuid: Uuid,
        buffer: Arc<Buffer>,
    ) -> Result<(), AdapterError>;

    async fn write_without_response(
        &self,
        characteristic_uuid: Uuid,
        bytes: &[u8],
    ) -> Result<(), AdapterError>;
}
