use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use blescan_discovery::adapter::BtleplugAdapter;
use blescan_discovery::{
    Bt510Sensor, BtAdapter, BtManager, EventBus, GatewayConfig, GatewayEvent, Scanner, Session,
    SessionParams, Worker,
};
use blescan_domain::Address;
use blescan_sinks::{JsonLinesSink, MeasurementSink, NoopSink};
use clap::Parser;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bluetooth adapter to bind to; the platform's first adapter if unset.
    #[arg(long)]
    adapter: Option<String>,

    /// Device name prefix to match (repeatable). With none given, autoscan
    /// never dispatches a worker, though advertisement-only decoding still
    /// runs for every device seen.
    #[arg(long = "prefix")]
    device_name_prefixes: Vec<String>,

    /// How often a new autoscan cycle begins.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5min")]
    scan_interval: Duration,

    /// How long each autoscan cycle dwells listening for advertisements.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    scan_duration: Duration,

    /// Devices advertising below this RSSI are ignored entirely.
    #[arg(long)]
    min_rssi_dbm: Option<i16>,

    /// Maximum number of simultaneous BLE sessions.
    #[arg(long, default_value_t = 4)]
    pool_size: usize,

    /// How long a session token may be held before it is force-expired.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "120s")]
    token_lifetime: Duration,

    /// Per-request JSON-RPC timeout.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    rpc_timeout: Duration,

    /// Log entries requested per `readLog` call.
    #[arg(long, default_value_t = 128)]
    max_log_entries_per_request: u32,

    /// Append decoded measurements as JSON lines to this file. With none
    /// given, measurements are decoded and discarded (`NoopSink`).
    #[arg(long)]
    sink_file: Option<PathBuf>,
}

fn build_config(args: &Args) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.bluetooth.adapter_name = args.adapter.clone();
    config.bluetooth.device_name_prefixes = args.device_name_prefixes.clone();
    config.bluetooth.scan_interval = args.scan_interval;
    config.bluetooth.min_rssi_dbm = args.min_rssi_dbm;
    config.bluetooth.pool_size = args.pool_size;
    config.bluetooth.token_lifetime = args.token_lifetime;
    config.sensor.bt510.rpc_timeout = args.rpc_timeout;
    config.sensor.max_log_entries_per_request = args.max_log_entries_per_request;
    config
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args);

    let adapter: Arc<dyn BtAdapter> = Arc::new(BtleplugAdapter::new(config.bluetooth.adapter_name.as_deref()).await?);
    adapter.power_on().await?;

    let tokens = BtManager::new(config.bluetooth.pool_size, config.bluetooth.token_lifetime);
    let events = EventBus::new();

    let sink: Arc<AsyncMutex<Box<dyn MeasurementSink>>> = Arc::new(AsyncMutex::new(match &args.sink_file {
        Some(path) => Box::new(JsonLinesSink::open(path).await?) as Box<dyn MeasurementSink>,
        None => Box::new(NoopSink) as Box<dyn MeasurementSink>,
    }));

    let worker = build_worker(adapter.clone(), tokens.clone(), events.clone(), config.clone(), sink.clone());
    let scanner = Scanner::new(
        adapter.clone(),
        tokens.clone(),
        events.clone(),
        config.bluetooth.scan_cooldown,
        config.bluetooth.min_rssi_dbm,
        worker,
    );

    spawn_event_printer(events.clone(), sink.clone());

    scanner
        .configure_autoscan(
            config.bluetooth.device_name_prefixes.clone(),
            config.bluetooth.scan_interval,
            args.scan_duration,
            true,
        )
        .await;
    scanner.start_autoscan();

    info!(prefixes = ?config.bluetooth.device_name_prefixes, "gateway running, waiting for ctrl-c");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scanner.shutdown();
    tokens.shutdown();

    match tokio::time::timeout(SHUTDOWN_BUDGET, close_sink(sink)).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "error closing sink"),
        Err(_) => warn!("sink did not close within the shutdown budget"),
    }

    Ok(())
}

async fn close_sink(sink: Arc<AsyncMutex<Box<dyn MeasurementSink>>>) -> Result<(), blescan_sinks::SinkError> {
    match Arc::try_unwrap(sink) {
        Ok(mutex) => mutex.into_inner().close().await,
        Err(_) => {
            warn!("sink still has outstanding references at shutdown, skipping close");
            Ok(())
        }
    }
}

fn spawn_event_printer(events: EventBus, sink: Arc<AsyncMutex<Box<dyn MeasurementSink>>>) {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(GatewayEvent::MeasurementObserved { address, measurement }) => {
                    info!(%address, kind = ?measurement.kind, value = ?measurement.value, "measurement observed");
                    let mut sink = sink.lock().await;
                    if let Err(error) = sink.record(address, std::slice::from_ref(&measurement)).await {
                        warn!(%address, %error, "failed to record advertisement measurement");
                    }
                }
                Ok(GatewayEvent::ScanStarted { prefixes, duration }) => {
                    debug!(?prefixes, ?duration, "scan started");
                }
                Ok(GatewayEvent::ScanCompleted { prefixes, count, duration }) => {
                    info!(?prefixes, count, ?duration, "scan completed");
                }
                Ok(GatewayEvent::DeviceDiscovered { address, name, matched_prefix }) => {
                    info!(%address, ?name, matched_prefix, "device discovered");
                }
                Ok(GatewayEvent::Connected { address }) => info!(%address, "connected"),
                Ok(GatewayEvent::Disconnected { address }) => info!(%address, "disconnected"),
                Ok(GatewayEvent::RequestFailed { address, kind, detail }) => {
                    warn!(%address, kind, detail, "request failed");
                }
                Ok(GatewayEvent::DeviceFailed { address, reason }) => {
                    warn!(%address, reason, "device failed");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn build_worker(
    adapter: Arc<dyn BtAdapter>,
    tokens: Arc<BtManager>,
    events: EventBus,
    config: GatewayConfig,
    sink: Arc<AsyncMutex<Box<dyn MeasurementSink>>>,
) -> Worker {
    let worker: Worker = Arc::new(move |address, name| {
        let adapter = adapter.clone();
        let tokens = tokens.clone();
        let events = events.clone();
        let config = config.clone();
        let sink = sink.clone();
        Box::pin(async move {
            debug!(%address, ?name, "starting device worker");
            if let Err(error) = download_from_device(address, adapter, tokens, events.clone(), config, sink).await {
                events.publish(GatewayEvent::DeviceFailed { address, reason: error.to_string() });
            }
        })
    });
    worker
}

async fn download_from_device(
    address: Address,
    adapter: Arc<dyn BtAdapter>,
    tokens: Arc<BtManager>,
    events: EventBus,
    config: GatewayConfig,
    sink: Arc<AsyncMutex<Box<dyn MeasurementSink>>>,
) -> Result<(), anyhow::Error> {
    let cancel = CancellationToken::new();
    let token = tokens.acquire(config.bluetooth.connection_timeout, &cancel).await?;
    let device = adapter.device(address).await?;

    let params = SessionParams {
        connection_attempts: config.bluetooth.connection_attempts,
        retry_delay: config.bluetooth.retry_delay,
        retry_delay_step: config.bluetooth.retry_delay_step,
        stabilization_delay: config.bluetooth.stabilization_delay,
        bt510: config.sensor.bt510.clone(),
        primary_service: *blescan_discovery::uuids::PRIMARY_SERVICE_UUID,
        command_characteristic: *blescan_discovery::uuids::COMMAND_CHARACTERISTIC_UUID,
        response_characteristic: *blescan_discovery::uuids::RESPONSE_CHARACTERISTIC_UUID,
    };

    let session = Arc::new(Session::new(device, token, params));
    session.open().await?;
    events.publish(GatewayEvent::Connected { address });

    let sensor = Bt510Sensor::new(session.clone(), config.sensor.max_log_entries_per_request);
    let mut collected = Vec::new();
    let result = sensor
        .download_log(config.sensor.polling_timeout, |batch| {
            collected.extend_from_slice(batch);
            true
        })
        .await;

    session.close().await;
    events.publish(GatewayEvent::Disconnected { address });

    match result {
        Ok(count) => {
            debug!(%address, count, "log download complete");
            if !collected.is_empty() {
                let mut sink = sink.lock().await;
                sink.record(address, &collected).await?;
            }
            Ok(())
        }
        Err(error) => {
            events.publish(GatewayEvent::RequestFailed {
                address,
                kind: "downloadLog".to_string(),
                detail: error.to_string(),
            });
            Err(error.into())
        }
    }
}
