/// Errors surfaced by the [`crate::adapter`] facade. These are the only
/// errors a `BtAdapter`/`BtDevice` implementation is allowed to return.
#[derive(Debug, thiserror::Error, Clone)]
pub enum AdapterError {
    #[error("BLE adapter unavailable")]
    Unavailable,
    #[error("BLE operation timed out")]
    Timeout,
    #[error("BLE protocol error: {0}")]
    Protocol(String),
    #[error("BLE I/O error: {0}")]
    Io(String),
}

/// Errors that can abort a per-device session. `TokenExpired` and
/// `ConnectFailed` are session-fatal; `ProtocolError` is retried up to
/// `MAX_COMMAND_RETRIES` before becoming fatal.
#[derive(Debug, thiserror::Error, Clone)]
pub enum SessionError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("failed to connect after all retry attempts")]
    ConnectFailed,
    #[error("required GATT service missing")]
    ServiceMissing,
    #[error("required GATT characteristic missing")]
    CharacteristicMissing,
    #[error("request timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("sensor returned an error: {code} {message}")]
    RpcError { code: i32, message: String },
    #[error("session's token expired mid-session")]
    TokenExpired,
}

/// Errors from a single scan cycle. A scan failure never aborts the whole
/// Scanner; it is logged and the cycle completes with whatever was found.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ScanError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("could not acquire a BT session token in time")]
    TokenUnavailable,
    #[error("scan cancelled")]
    Cancelled,
}
