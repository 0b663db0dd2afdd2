use std::sync::Arc;
use std::time::Duration;

use blescan_domain::Address;
use blescan_rpc::{chunk_for_mtu, IdAllocator, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::BtDevice;
use crate::buffer::{Buffer, AGGREGATE_POOL_THRESHOLD};
use crate::config::Bt510Config;
use crate::error::SessionError;
use crate::token::Token;

/// One state machine instance per connected device (§4.5). `Idle` and
/// `Closed`/`Failed` are terminal-ish; the rest form the connect →
/// initialize → request/response loop a session cycles through for as
/// long as its caller keeps it open.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    Initializing,
    Ready,
    Requesting,
    Closing,
    Closed,
    Failed(String),
}

struct RetryDelays {
    base: Duration,
    step: Duration,
}

impl RetryDelays {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base + self.step * attempt.saturating_sub(1)
    }
}

/// Owns one device's BLE session: connection lifecycle, the single-flight
/// request/response protocol, and the token that gates it. A session's
/// `Buffer` belongs to it exclusively (§5): the notification handler
/// writes, the request waiter reads, and nothing else touches it.
pub struct Session {
    address: Address,
    device: Arc<dyn BtDevice>,
    buffer: Arc<Buffer>,
    state: AsyncMutex<SessionState>,
    request_lock: AsyncMutex<()>,
    ids: IdAllocator,
    token: AsyncMutex<Option<Token>>,
    connection_attempts: u32,
    retry: RetryDelays,
    stabilization_delay: Duration,
    bt510: Bt510Config,
    primary_service: Uuid,
    command_characteristic: Uuid,
    response_characteristic: Uuid,
    cancel: CancellationToken,
}

pub struct SessionParams {
    pub connection_attempts: u32,
    pub retry_delay: Duration,
    pub retry_delay_step: Duration,
    pub stabilization_delay: Duration,
    pub bt510: Bt510Config,
    pub primary_service: Uuid,
    pub command_characteristic: Uuid,
    pub response_characteristic: Uuid,
}

impl Session {
    #[must_use]
    pub fn new(device: Arc<dyn BtDevice>, token: Token, params: SessionParams) -> Self {
        Session {
            address: device.address(),
            device,
            buffer: Arc::new(Buffer::new()),
            state: AsyncMutex::new(SessionState::Idle),
            request_lock: AsyncMutex::new(()),
            ids: IdAllocator::new(),
            token: AsyncMutex::new(Some(token)),
            connection_attempts: params.connection_attempts,
            retry: RetryDelays {
                base: params.retry_delay,
                step: params.retry_delay_step,
            },
            stabilization_delay: params.stabilization_delay,
            bt510: params.bt510,
            primary_service: params.primary_service,
            command_characteristic: params.command_characteristic,
            response_characteristic: params.response_characteristic,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Establishes the connection and initializes the session. Idempotent:
    /// calling `open` again once `Ready` is a no-op.
    pub async fn open(&self) -> Result<(), SessionError> {
        {
            let state = self.state.lock().await;
            if matches!(*state, SessionState::Ready | SessionState::Requesting) {
                return Ok(());
            }
        }

        self.ensure_valid_token().await?;
        *self.state.lock().await = SessionState::Connecting;

        let mut last_error = None;
        for attempt in 1..=self.connection_attempts {
            match self.device.connect(self.bt510.rpc_timeout).await {
                Ok(()) => {
                    sleep(self.stabilization_delay).await;
                    last_error = None;
                    break;
                }
                Err(error) => {
                    warn!(address = %self.address, attempt, %error, "connect attempt failed");
                    last_error = Some(error);
                    if attempt < self.connection_attempts {
                        sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        if last_error.is_some() {
            self.fail(SessionError::ConnectFailed).await;
            return Err(SessionError::ConnectFailed);
        }

        if let Err(error) = self.initialize().await {
            self.fail(error.clone()).await;
            return Err(error);
        }

        *self.state.lock().await = SessionState::Ready;
        info!(address = %self.address, "session ready");
        Ok(())
    }

    async fn initialize(&self) -> Result<(), SessionError> {
        *self.state.lock().await = SessionState::Initializing;

        self.device
            .discover_services()
            .await
            .map_err(SessionError::Adapter)?;

        if !self
            .device
            .has_service(self.primary_service)
            .await
            .map_err(SessionError::Adapter)?
        {
            return Err(SessionError::ServiceMissing);
        }

        if !self
            .device
            .has_characteristic(self.command_characteristic)
            .await
            .map_err(SessionError::Adapter)?
        {
            return Err(SessionError::CharacteristicMissing);
        }

        if !self
            .device
            .has_characteristic(self.response_characteristic)
            .await
            .map_err(SessionError::Adapter)?
        {
            return Err(SessionError::CharacteristicMissing);
        }

        self.device
            .subscribe_notifications(self.response_characteristic, self.buffer.clone())
            .await
            .map_err(SessionError::Adapter)?;

        Ok(())
    }

    /// Sends a JSON-RPC request and waits for its matching response,
    /// single-flight for the lifetime of the call (§4.5): a second
    /// concurrent caller blocks on `request_lock` until this one
    /// completes. A single request's error is per-attempt, not
    /// session-fatal: the session returns to `Ready` regardless of
    /// outcome so a caller retrying through `request_with_retry` can
    /// resend with a fresh id. `request_with_retry` owns the terminal
    /// `Failed` transition once retries are exhausted.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<JsonRpcResponse, SessionError> {
        let _guard = self.request_lock.lock().await;
        self.ensure_valid_token().await?;

        {
            let mut state = self.state.lock().await;
            if !matches!(*state, SessionState::Ready) {
                return Err(SessionError::ProtocolError(
                    "request attempted outside Ready state".to_string(),
                ));
            }
            *state = SessionState::Requesting;
        }

        let result = self.request_once(method, params, deadline).await;

        *self.state.lock().await = SessionState::Ready;
        result
    }

    async fn request_once(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<JsonRpcResponse, SessionError> {
        let id = self.ids.next();
        let request = JsonRpcRequest::new(method, params, id);
        let bytes = request
            .to_bytes()
            .map_err(|e| SessionError::ProtocolError(e.to_string()))?;

        self.buffer.clear();

        for chunk in chunk_for_mtu(&bytes, self.bt510.mtu) {
            self.device
                .write_without_response(self.command_characteristic, chunk)
                .await
                .map_err(SessionError::Adapter)?;
        }

        let response = timeout(deadline, self.await_response(id))
            .await
            .map_err(|_| SessionError::Timeout)??;

        if response.jsonrpc != blescan_rpc::JSONRPC_VERSION {
            return Err(SessionError::ProtocolError(format!(
                "unexpected jsonrpc version {}",
                response.jsonrpc
            )));
        }
        if response.id != id {
            return Err(SessionError::ProtocolError(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        if let Some(error) = response.error {
            return Err(SessionError::RpcError {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response)
    }

    async fn await_response(&self, id: u32) -> Result<JsonRpcResponse, SessionError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let snapshot = self.buffer.snapshot_pooled(AGGREGATE_POOL_THRESHOLD);
            if let Some((response, _consumed)) = blescan_rpc::try_extract_response(&snapshot) {
                if response.id == id {
                    return Ok(response);
                }
                debug!(expected = id, got = response.id, "discarding stale response");
            }
            drop(snapshot);
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// A request that failed with a retryable error is resent by the
    /// caller (typically the sensor facade) up to `max_command_retries`
    /// times; each attempt allocates a fresh id, poisoning the previous
    /// one forever (§4.5). Owns the session's terminal `Failed`
    /// transition: a session-fatal error fails it immediately, and
    /// exhausting every retry fails it with the last error seen.
    pub async fn request_with_retry(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<JsonRpcResponse, SessionError> {
        let mut last_error = None;
        for attempt in 1..=self.bt510.max_command_retries {
            match self.request(method, params.clone(), deadline).await {
                Ok(response) => return Ok(response),
                Err(error @ SessionError::TokenExpired) | Err(error @ SessionError::Cancelled) => {
                    self.fail(error.clone()).await;
                    return Err(error);
                }
                Err(error) => {
                    warn!(address = %self.address, attempt, %error, "request failed, retrying");
                    last_error = Some(error);
                    if attempt < self.bt510.max_command_retries {
                        sleep(self.bt510.retry_delay).await;
                    }
                }
            }
        }
        let error = last_error.expect("loop runs at least once");
        self.fail(error.clone()).await;
        Err(error)
    }

    async fn ensure_valid_token(&self) -> Result<(), SessionError> {
        let token = self.token.lock().await;
        match token.as_ref() {
            Some(t) if t.is_valid() => Ok(()),
            Some(_) => Err(SessionError::TokenExpired),
            None => Err(SessionError::Cancelled),
        }
    }

    /// Every session-fatal path routes through here. Performs the same
    /// guaranteed cleanup as `close()` — cancel the request waiter,
    /// disconnect, release the token — before recording the terminal
    /// `Failed` state, so a device that fails initialization or exhausts
    /// its command retries never stays connected with its token held
    /// (§4.5, §7).
    async fn fail(&self, error: SessionError) {
        self.cancel.cancel();
        if let Err(disconnect_error) = self.device.disconnect().await {
            warn!(address = %self.address, %disconnect_error, "error disconnecting during session failure");
        }
        self.token.lock().await.take();
        *self.state.lock().await = SessionState::Failed(error.to_string());
    }

    /// Transitions to `Closing` and unconditionally tears the connection
    /// down, even if the session never reached `Ready`. Cancels any
    /// in-flight request waiter.
    pub async fn close(&self) {
        *self.state.lock().await = SessionState::Closing;
        self.cancel.cancel();
        if let Err(error) = self.device.disconnect().await {
            warn!(address = %self.address, %error, "error disconnecting during close");
        }
        self.token.lock().await.take();
        *self.state.lock().await = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapterBuilder;
    use crate::adapter::BtAdapter;
    use crate::token::BtManager;

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

    async fn open_session(adapter_fragments: Vec<Vec<u8>>) -> (Arc<Session>, Address) {
        let address = Address::from_bytes([1, 2, 3, 4, 5, 6]);
        let adapter = FakeAdapterBuilder::new()
            .with_scripted_response(address, adapter_fragments)
            .build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Arc::new(Session::new(device, token, test_params()));
        session.open().await.unwrap();
        (session, address)
    }

    #[tokio::test]
    async fn open_transitions_idle_to_ready() {
        let (session, _address) = open_session(vec![]).await;
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn open_is_idempotent_once_ready() {
        let (session, _address) = open_session(vec![]).await;
        session.open().await.unwrap();
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn request_matches_response_by_id_and_returns_to_ready() {
        let response = br#"{"jsonrpc":"2.0","id":1,"result":"ok"}"#.to_vec();
        let (session, _address) = open_session(vec![response]).await;

        let result = session
            .request("set", serde_json::json!({"epoch": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.id, 1);
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn request_surfaces_an_rpc_error_object() {
        let response = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"bad"}}"#.to_vec();
        let (session, _address) = open_session(vec![response]).await;

        let result = session
            .request("get", serde_json::json!(["mtu"]), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SessionError::RpcError { code: -1, .. })));
    }

    #[tokio::test]
    async fn close_tears_down_even_from_idle() {
        let address = Address::from_bytes([9, 9, 9, 9, 9, 9]);
        let adapter = FakeAdapterBuilder::new().build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Session::new(device, token, test_params());

        session.close().await;
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn request_with_retry_recovers_after_a_transient_write_failure() {
        let address = Address::from_bytes([4, 4, 4, 4, 4, 4]);
        // The first attempt's write never reaches the device, so only the
        // retry's id (2) ever gets a scripted reply.
        let response = br#"{"jsonrpc":"2.0","id":2,"result":"ok"}"#.to_vec();
        let adapter = FakeAdapterBuilder::new()
            .with_scripted_response(address, vec![response])
            .with_write_failures(address, 1)
            .build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Arc::new(Session::new(device, token, test_params()));
        session.open().await.unwrap();

        let result = session
            .request_with_retry("set", serde_json::json!({"epoch": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.id, 2);
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn request_with_retry_fails_the_session_once_retries_are_exhausted() {
        let address = Address::from_bytes([6, 6, 6, 6, 6, 6]);
        let adapter = FakeAdapterBuilder::new().with_write_failures(address, 10).build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Arc::new(Session::new(device, token, test_params()));
        session.open().await.unwrap();

        let result = session
            .request_with_retry("set", serde_json::json!({"epoch": 1}), Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert!(matches!(session.state().await, SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn open_fails_with_service_missing_when_the_primary_service_is_absent() {
        let address = Address::from_bytes([5, 5, 5, 5, 5, 5]);
        let adapter = FakeAdapterBuilder::new().with_missing_service(address).build();
        let device = adapter.device(address).await.unwrap();
        let manager = BtManager::new(4, Duration::from_secs(120));
        let token = manager.acquire(Duration::from_secs(1), &CancellationToken::new()).await.unwrap();
        let session = Session::new(device, token, test_params());

        let result = session.open().await;
        assert!(matches!(result, Err(SessionError::ServiceMissing)));
        assert!(matches!(session.state().await, SessionState::Failed(_)));
    }
}
