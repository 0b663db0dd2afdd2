use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blescan_domain::Address;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use dashmap::DashMap;
use futures::StreamExt;
use tracing::debug;
use uuid::Uuid;

use super::{AdvertisedDevice, BtAdapter, BtDevice};
use crate::buffer::Buffer;
use crate::error::AdapterError;

fn to_address(addr: btleplug::api::BDAddr) -> Address {
    Address::from_bytes(addr.into_inner())
}

/// `BtAdapter` backed by a real `btleplug` central. One instance owns one
/// adapter, selected either by name (§5 `adapter_name`) or, absent a name,
/// the first adapter the platform reports — following the teacher's
/// `MoteScanner`/`LocalScanner` pattern of popping the last adapter off
/// `manager.adapters()`.
pub struct BtleplugAdapter {
    adapter: Adapter,
    peripherals: DashMap<Address, Peripheral>,
}

impl BtleplugAdapter {
    pub async fn new(adapter_name: Option<&str>) -> Result<Self, AdapterError> {
        let manager = Manager::new()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        let mut adapters = manager
            .adapters()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        if adapters.is_empty() {
            return Err(AdapterError::Unavailable);
        }

        let adapter = if let Some(name) = adapter_name {
            let mut found = None;
            for candidate in adapters.drain(..) {
                let info = candidate
                    .adapter_info()
                    .await
                    .unwrap_or_default();
                if info.contains(name) {
                    found = Some(candidate);
                    break;
                }
            }
            found.ok_or(AdapterError::Unavailable)?
        } else {
            adapters.pop().ok_or(AdapterError::Unavailable)?
        };

        Ok(BtleplugAdapter {
            adapter,
            peripherals: DashMap::new(),
        })
    }
}

#[async_trait]
impl BtAdapter for BtleplugAdapter {
    async fn power_on(&self) -> Result<(), AdapterError> {
        // btleplug adapters are powered by the platform's Bluetooth stack;
        // there is no explicit power-on call in the cross-platform API.
        // We treat adapter enumeration in `new` as the readiness check.
        Ok(())
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn stop_discovery(&self) -> Result<(), AdapterError> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn advertised_devices(&self) -> Result<Vec<AdvertisedDevice>, AdapterError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;

        let mut devices = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let Some(properties) = peripheral
                .properties()
                .await
                .map_err(|e| AdapterError::Io(e.to_string()))?
            else {
                continue;
            };
            let address = to_address(properties.address);
            self.peripherals.insert(address, peripheral);
            devices.push(AdvertisedDevice {
                address,
                name: properties.local_name,
                rssi: properties.rssi,
                manufacturer_data: properties.manufacturer_data,
            });
        }
        Ok(devices)
    }

    async fn device(&self, address: Address) -> Result<Arc<dyn BtDevice>, AdapterError> {
        let peripheral = self
            .peripherals
            .get(&address)
            .map(|entry| entry.value().clone())
            .ok_or(AdapterError::Unavailable)?;
        Ok(Arc::new(BtleplugDevice { address, peripheral }))
    }
}

struct BtleplugDevice {
    address: Address,
    peripheral: Peripheral,
}

#[async_trait]
impl BtDevice for BtleplugDevice {
    fn address(&self) -> Address {
        self.address
    }

    async fn connect(&self, timeout: Duration) -> Result<(), AdapterError> {
        tokio::time::timeout(timeout, self.peripheral.connect())
            .await
            .map_err(|_| AdapterError::Timeout)?
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn is_connected(&self) -> Result<bool, AdapterError> {
        self.peripheral
            .is_connected()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn discover_services(&self) -> Result<(), AdapterError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    async fn has_service(&self, uuid: Uuid) -> Result<bool, AdapterError> {
        Ok(self.peripheral.services().iter().any(|s| s.uuid == uuid))
    }

    async fn has_characteristic(&self, uuid: Uuid) -> Result<bool, AdapterError> {
        Ok(self
            .peripheral
            .characteristics()
            .iter()
            .any(|c| c.uuid == uuid))
    }

    async fn subscribe_notifications(
        &self,
        characteristic_uuid: Uuid,
        buffer: Arc<Buffer>,
    ) -> Result<(), AdapterError> {
        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic_uuid)
            .ok_or_else(|| AdapterError::Protocol(format!("characteristic {characteristic_uuid} missing")))?;

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;

        let mut stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == characteristic_uuid {
                    buffer.append(&notification.value);
                }
            }
            debug!("notification stream for {characteristic_uuid} ended");
        });

        Ok(())
    }

    async fn write_without_response(
        &self,
        characteristic_uuid: Uuid,
        bytes: &[u8],
    ) -> Result<(), AdapterError> {
        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic_uuid)
            .ok_or_else(|| AdapterError::Protocol(format!("characteristic {characteristic_uuid} missing")))?;

        self.peripheral
            .write(&characteristic, bytes, WriteType::WithoutResponse)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }
}
