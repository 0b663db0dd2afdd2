//! Runtime-bound half of the BLE sensor gateway core: the scanner control
//! loop, the bounded BT session token pool, the per-device session state
//! machine, the platform adapter facade, and the BT510 sensor facade that
//! binds a session to `blescan-bt510`'s codec. `blescan-domain` carries
//! everything here that doesn't need an async runtime or a concrete BLE
//! stack; this crate is the part that does.

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod scanner;
pub mod sensor;
pub mod session;
pub mod token;
pub mod uuids;

pub use adapter::{AdvertisedDevice, BtAdapter, BtDevice};
pub use buffer::{Buffer, PooledSnapshot};
pub use config::{AgentConfig, BluetoothConfig, Bt510Config, GatewayConfig, SensorConfig};
pub use error::{AdapterError, ScanError, SessionError};
pub use events::{EventBus, GatewayEvent};
pub use scanner::{Scanner, Worker};
pub use sensor::Bt510Sensor;
pub use session::{Session, SessionParams, SessionState};
pub use token::{BtManager, Token};
