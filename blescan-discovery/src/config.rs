use std::time::Duration;

/// Process-start configuration for the gateway core. Treated as read-only
/// once constructed; loading and validating it from an external source
/// (YAML, environment, CLI flags) is the caller's responsibility — see
/// `blescan-cli` for the `clap`-based front end that builds one of these.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bluetooth: BluetoothConfig,
    pub sensor: SensorConfig,
    pub agent: AgentConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bluetooth: BluetoothConfig::default(),
            sensor: SensorConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BluetoothConfig {
    pub adapter_name: Option<String>,
    pub discovery_timeout: Duration,
    pub connection_timeout: Duration,
    pub connection_attempts: u32,
    pub retry_delay: Duration,
    pub retry_delay_step: Duration,
    pub device_name_prefixes: Vec<String>,
    pub service_uuid_allowlist: Vec<String>,
    pub min_rssi_dbm: Option<i16>,
    pub pool_size: usize,
    pub token_lifetime: Duration,
    pub scan_cooldown: Duration,
    pub scan_interval: Duration,
    pub stabilization_delay: Duration,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            adapter_name: None,
            discovery_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(10),
            connection_attempts: 3,
            retry_delay: Duration::from_secs(1),
            retry_delay_step: Duration::from_secs(1),
            device_name_prefixes: Vec::new(),
            service_uuid_allowlist: Vec::new(),
            min_rssi_dbm: None,
            pool_size: 4,
            token_lifetime: Duration::from_secs(120),
            scan_cooldown: Duration::from_secs(5 * 60),
            scan_interval: Duration::from_secs(5 * 60),
            stabilization_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub default_collection_interval: Duration,
    pub max_log_entries_per_request: u32,
    pub polling_timeout: Duration,
    pub bt510: Bt510Config,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            default_collection_interval: Duration::from_secs(60),
            max_log_entries_per_request: 128,
            polling_timeout: Duration::from_secs(30),
            bt510: Bt510Config::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bt510Config {
    pub rpc_timeout: Duration,
    pub max_command_retries: u32,
    pub mtu: usize,
    pub retry_delay: Duration,
}

impl Default for Bt510Config {
    fn default() -> Self {
        Bt510Config {
            rpc_timeout: Duration::from_secs(30),
            max_command_retries: 5,
            mtu: 244,
            retry_delay: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub pin: String,
    pub dbus_agent_path: String,
    pub capability_token: String,
    pub auto_authorize: bool,
    pub reregistration_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            pin: "000000".to_string(),
            dbus_agent_path: "/gateway/agent".to_string(),
            capability_token: String::new(),
            auto_authorize: true,
            reregistration_interval: Duration::from_secs(60 * 60),
        }
    }
}
