use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blescan_domain::{Address, AdvertisementSnapshot, DeviceType};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::BtAdapter;
use crate::error::ScanError;
use crate::events::{EventBus, GatewayEvent};
use crate::token::BtManager;

/// Entries in `last_seen_at` older than this are purged by the background
/// sweeper so the map does not grow unbounded over a long-running process.
const LAST_SEEN_RETENTION: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const SCAN_TICK: Duration = Duration::from_secs(1);
const SCAN_MUTEX_TIMEOUT: Duration = Duration::from_secs(1);
const SCAN_TOKEN_TIMEOUT: Duration = Duration::from_secs(60);
const AUTOSCAN_ERROR_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AutoscanSchedule {
    prefixes: Vec<String>,
    interval: Duration,
    duration: Duration,
    enabled: bool,
}

impl Default for AutoscanSchedule {
    fn default() -> Self {
        AutoscanSchedule {
            prefixes: Vec::new(),
            interval: Duration::from_secs(5 * 60),
            duration: Duration::from_secs(10),
            enabled: false,
        }
    }
}

/// A unit of work dispatched for a newly-discovered, not-yet-cooling-down
/// device. The caller (`blescan-cli`, or a test) supplies the closure that
/// actually opens a session and talks to the device; the Scanner's only
/// job is deciding *whether* and *when* to dispatch it. The closure
/// returns a future so real per-device work (connect, subscribe, download)
/// can run to completion before the address is freed from `in_process` —
/// a plain synchronous callback would let `in_process` clear the instant
/// the closure returns, not once the device work it kicks off finishes.
pub type Worker = Arc<dyn Fn(Address, Option<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sustains discovery with bounded resources and guarantees single-flight
/// dispatch per address (§4.1). One `Scanner` instance is a process-wide
/// service: construct it once, hand clones of its `Arc` to whatever needs
/// to trigger or configure a scan.
pub struct Scanner {
    adapter: Arc<dyn BtAdapter>,
    tokens: Arc<BtManager>,
    events: EventBus,
    schedule: RwLock<AutoscanSchedule>,
    scan_mutex: AsyncMutex<()>,
    last_seen_at: DashMap<Address, Instant>,
    in_process: DashMap<Address, ()>,
    autoscan_enabled: Arc<AtomicBool>,
    autoscan_cancel: CancellationToken,
    cooldown: Duration,
    min_rssi_dbm: Option<i16>,
    worker: Worker,
}

impl Scanner {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn BtAdapter>,
        tokens: Arc<BtManager>,
        events: EventBus,
        cooldown: Duration,
        min_rssi_dbm: Option<i16>,
        worker: Worker,
    ) -> Arc<Self> {
        Arc::new(Scanner {
            adapter,
            tokens,
            events,
            schedule: RwLock::new(AutoscanSchedule::default()),
            scan_mutex: AsyncMutex::new(()),
            last_seen_at: DashMap::new(),
            in_process: DashMap::new(),
            autoscan_enabled: Arc::new(AtomicBool::new(false)),
            autoscan_cancel: CancellationToken::new(),
            cooldown,
            min_rssi_dbm,
            worker,
        })
    }

    /// Atomically replaces the autoscan filter set and schedule.
    pub async fn configure_autoscan(
        &self,
        prefixes: Vec<String>,
        interval: Duration,
        duration: Duration,
        enabled: bool,
    ) {
        let mut schedule = self.schedule.write().await;
        *schedule = AutoscanSchedule { prefixes, interval, duration, enabled };
        self.autoscan_enabled.store(enabled, Ordering::Release);
    }

    pub fn start_autoscan(self: &Arc<Self>) {
        self.autoscan_enabled.store(true, Ordering::Release);
        let scanner = self.clone();
        tokio::spawn(async move { scanner.autoscan_loop().await });
        self.clone().spawn_sweeper();
    }

    pub fn stop_autoscan(&self) {
        self.autoscan_enabled.store(false, Ordering::Release);
    }

    pub fn shutdown(&self) {
        self.autoscan_cancel.cancel();
        self.autoscan_enabled.store(false, Ordering::Release);
    }

    /// Polls every `SCAN_TICK` to check config/shutdown, but only actually
    /// starts a scan once `schedule.interval` has elapsed since the last
    /// one started — `SCAN_TICK` is a polling cadence, not the scan
    /// interval itself.
    async fn autoscan_loop(self: Arc<Self>) {
        let mut last_scan_at: Option<Instant> = None;
        loop {
            tokio::select! {
                () = self.autoscan_cancel.cancelled() => {
                    debug!("autoscan loop cancelled");
                    return;
                }
                () = tokio::time::sleep(SCAN_TICK) => {}
            }

            if !self.autoscan_enabled.load(Ordering::Acquire) {
                continue;
            }

            let schedule = self.schedule.read().await.clone();
            if schedule.prefixes.is_empty() {
                continue;
            }

            if let Some(at) = last_scan_at {
                if at.elapsed() < schedule.interval {
                    continue;
                }
            }

            match tokio::time::timeout(SCAN_MUTEX_TIMEOUT, self.scan_mutex.lock()).await {
                Ok(_guard) => {
                    last_scan_at = Some(Instant::now());
                    if let Err(error) = self
                        .run_scan(schedule.prefixes.clone(), schedule.duration)
                        .await
                    {
                        warn!(%error, "autoscan cycle failed, backing off");
                        tokio::select! {
                            () = self.autoscan_cancel.cancelled() => return,
                            () = tokio::time::sleep(AUTOSCAN_ERROR_BACKOFF) => {}
                        }
                    }
                }
                Err(_) => {
                    debug!("autoscan tick skipped: scan mutex busy");
                }
            }
        }
    }

    fn spawn_sweeper(self: Arc<Self>) {
        let cancel = self.autoscan_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(SWEEP_INTERVAL) => {}
                }
                let now = Instant::now();
                self.last_seen_at
                    .retain(|_, seen_at| now.duration_since(*seen_at) < LAST_SEEN_RETENTION);
            }
        });
    }

    /// One-shot scan; returns the count of newly dispatched devices.
    pub async fn scan_once(
        self: &Arc<Self>,
        prefixes: Vec<String>,
        duration: Duration,
    ) -> Result<usize, ScanError> {
        let _guard = tokio::time::timeout(SCAN_MUTEX_TIMEOUT, self.scan_mutex.lock())
            .await
            .map_err(|_| ScanError::Cancelled)?;
        self.run_scan(prefixes, duration).await
    }

    async fn run_scan(self: &Arc<Self>, prefixes: Vec<String>, duration: Duration) -> Result<usize, ScanError> {
        self.events.publish(GatewayEvent::ScanStarted { prefixes: prefixes.clone(), duration });

        let cancel = CancellationToken::new();
        let token = self.tokens.acquire(SCAN_TOKEN_TIMEOUT, &cancel).await?;

        let count = self.scan_with_token(&prefixes, duration).await;
        drop(token);

        self.events.publish(GatewayEvent::ScanCompleted { prefixes, count, duration });
        Ok(count)
    }

    /// Runs the enumerate/dispatch loop for one scan cycle. Adapter errors
    /// at any point — including `start_discovery` itself — are logged and
    /// the cycle completes with whatever devices were found (§4.1 "Failure
    /// semantics"); only token-acquisition failure aborts a scan cycle, and
    /// that is handled by the caller before this is ever called.
    async fn scan_with_token(self: &Arc<Self>, prefixes: &[String], duration: Duration) -> usize {
        if let Err(error) = self.adapter.start_discovery().await {
            warn!(%error, "failed to start discovery, scan cycle will find nothing");
        }
        let scan_end = Instant::now() + duration;
        let mut dispatched = 0usize;

        loop {
            if Instant::now() >= scan_end {
                break;
            }

            match self.adapter.advertised_devices().await {
                Ok(devices) => {
                    for device in devices {
                        // Mirrors the teacher's `local.rs` discovery loop,
                        // which only turns a platform advertisement into a
                        // domain event once an RSSI reading is present.
                        let Some(rssi_dbm) = device.rssi else {
                            continue;
                        };
                        if let Some(threshold) = self.min_rssi_dbm {
                            if rssi_dbm < threshold {
                                continue;
                            }
                        }

                        let snapshot = AdvertisementSnapshot::new(
                            device.address,
                            device.name.clone(),
                            device.manufacturer_data.clone(),
                            rssi_dbm,
                            Utc::now(),
                        );

                        // Advertisement-only path: decode straight to a
                        // measurement with no connection and no token,
                        // regardless of whether this device's name matches
                        // the autoscan filters below (§2 data flow).
                        if snapshot.device_type() == DeviceType::Bt510 {
                            if let Some(measurement) = blescan_bt510::parse_advertisement(
                                &snapshot.manufacturer_data,
                                snapshot.last_seen,
                            ) {
                                self.events.publish(GatewayEvent::MeasurementObserved {
                                    address: snapshot.address,
                                    measurement,
                                });
                            }
                        }

                        let Some(name) = snapshot.local_name.as_ref().filter(|n| !n.is_empty()) else {
                            continue;
                        };
                        let Some(matched_prefix) = matching_prefix(name, prefixes) else {
                            continue;
                        };
                        if self.try_mark_for_processing(snapshot.address) {
                            self.events.publish(GatewayEvent::DeviceDiscovered {
                                address: snapshot.address,
                                name: Some(name.clone()),
                                matched_prefix: matched_prefix.clone(),
                            });
                            self.dispatch_worker(snapshot.address, Some(name.clone()));
                            dispatched += 1;
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "adapter error during scan, continuing with what was found");
                }
            }

            tokio::time::sleep(SCAN_TICK).await;
        }

        if let Err(error) = self.adapter.stop_discovery().await {
            warn!(%error, "error stopping discovery");
        }

        dispatched
    }

    fn dispatch_worker(self: &Arc<Self>, address: Address, name: Option<String>) {
        let scanner = self.clone();
        let worker = self.worker.clone();
        tokio::spawn(async move {
            worker(address, name).await;
            scanner.in_process.remove(&address);
        });
    }

    /// Atomic admission control (§4.1): rejects an address already being
    /// processed or still within its cooldown window; otherwise marks it
    /// seen-now and in-process in one update and accepts.
    fn try_mark_for_processing(&self, address: Address) -> bool {
        if self.in_process.contains_key(&address) {
            return false;
        }

        let now = Instant::now();
        let mut accepted = false;
        self.last_seen_at
            .entry(address)
            .and_modify(|seen_at| {
                if now.duration_since(*seen_at) >= self.cooldown {
                    *seen_at = now;
                    accepted = true;
                }
            })
            .or_insert_with(|| {
                accepted = true;
                now
            });

        if accepted {
            self.in_process.insert(address, ());
        }
        accepted
    }
}

fn matching_prefix(name: &str, prefixes: &[String]) -> Option<String> {
    let lower_name = name.to_lowercase();
    prefixes
        .iter()
        .find(|prefix| lower_name.starts_with(&prefix.to_lowercase()))
        .cloned()
}
