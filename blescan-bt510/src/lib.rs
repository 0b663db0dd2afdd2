//! Binary wire protocol for the BT510 (Laird) sensor family: on-device log
//! entry decoding, scalar conversions, and advertisement-record parsing.
//! Contains no BLE transport or connection logic — see `blescan-discovery`
//! for the session manager that drives a BT510 device over the air.

pub mod advertisement;
pub mod event_code;
pub mod log_entry;
pub mod scalars;

pub use advertisement::parse_advertisement;
pub use log_entry::parse_log;
pub use scalars::{decode_battery, decode_temperature, encode_temperature};

/// Primary GATT service UUID exposed by BT510 firmware.
pub const PRIMARY_SERVICE_UUID: &str = "569a1101-b87f-490c-92cb-11ba5ea5167c";
/// Characteristic the gateway writes JSON-RPC requests to.
pub const COMMAND_CHARACTERISTIC_UUID: &str = "569a2001-b87f-490c-92cb-11ba5ea5167c";
/// Characteristic the gateway subscribes to for JSON-RPC response fragments.
pub const RESPONSE_CHARACTERISTIC_UUID: &str = "569a2000-b87f-490c-92cb-11ba5ea5167c";
