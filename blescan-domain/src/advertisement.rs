use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::address::Address;

/// A single BLE advertisement as observed during one discovery tick. Never
/// mutated after construction; a later advertisement from the same address
/// produces a new snapshot rather than updating this one.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementSnapshot {
    pub address: Address,
    pub local_name: Option<String>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub rssi_dbm: i16,
    pub last_seen: DateTime<Utc>,
}

impl AdvertisementSnapshot {
    #[must_use]
    pub fn new(
        address: Address,
        local_name: Option<String>,
        manufacturer_data: HashMap<u16, Vec<u8>>,
        rssi_dbm: i16,
        last_seen: DateTime<Utc>,
    ) -> Self {
        AdvertisementSnapshot {
            address,
            local_name,
            manufacturer_data,
            rssi_dbm,
            last_seen,
        }
    }

    #[must_use]
    pub fn device_type(&self) -> crate::device_type::DeviceType {
        crate::device_type::DeviceType::classify(&self.manufacturer_data)
    }
}
