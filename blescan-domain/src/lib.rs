//! Shared, runtime-agnostic data model for the BLE sensor gateway: device
//! addressing, device family classification, advertisement snapshots and
//! decoded measurements. Nothing in this crate depends on an async runtime
//! or a concrete BLE stack — those live in `blescan-discovery`.

pub mod address;
pub mod advertisement;
pub mod device_type;
pub mod error;
pub mod measurement;

pub use address::Address;
pub use advertisement::AdvertisementSnapshot;
pub use device_type::{DeviceType, SensorType, BT510_COMPANY_ID, DUMMY_COMPANY_ID};
pub use measurement::{Measurement, MeasurementKind, Origin};
