// ── Polling coordinator ──
//
// Two independently-cadenced refresh cycles (device/state, telemetry)
// over one account, merged into an immutable snapshot. Per-device
// failures degrade to stale data; only credential failures escalate.
// Per-device calls run sequentially -- the upstream API rate-limits per
// account, so no concurrent calls are issued.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fenix_api::CloudClient;

use crate::config::PollingConfig;
use crate::error::CoreError;
use crate::model::{Device, NormalizedState, Snapshot, TelemetrySample};
use crate::normalize;

/// Base scheduler granularity; each tick checks which cadences are due.
const TICK_PERIOD: Duration = Duration::from_secs(1);

// ── Coordinator ──────────────────────────────────────────────────────

/// The polling entry point for hosts.
///
/// Cheaply cloneable via `Arc`. Owns the cycle state and publishes
/// merged `{devices, states, telemetry}` snapshots; the previous
/// snapshot stays visible to readers until a new one is fully
/// assembled.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    client: Arc<CloudClient>,
    polling: PollingConfig,
    cycle: Mutex<CycleState>,
    snapshot: ArcSwap<Snapshot>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CycleState {
    devices: BTreeMap<String, Device>,
    states: BTreeMap<String, NormalizedState>,
    telemetry: BTreeMap<String, TelemetrySample>,
    devices_loaded: bool,
    last_device_refresh: Option<Instant>,
    last_data_refresh: Option<Instant>,
    force_next: bool,
}

/// How a refresh step failed: `Fatal` aborts polling and surfaces to
/// the host as a re-authentication signal; `Soft` is logged and retried
/// on the next scheduled cycle.
enum CycleFailure {
    Fatal(CoreError),
    Soft(CoreError),
}

impl Coordinator {
    pub fn new(client: Arc<CloudClient>, polling: PollingConfig) -> Self {
        let initial = Arc::new(Snapshot::default());
        let (snapshot_tx, _) = watch::channel(Arc::clone(&initial));

        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                polling,
                cycle: Mutex::new(CycleState::default()),
                snapshot: ArcSwap::new(initial),
                snapshot_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// The underlying client (command dispatch, raw calls).
    pub fn client(&self) -> &Arc<CloudClient> {
        &self.inner.client
    }

    /// Wait-free read of the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Force both cadences on the next tick -- used after a command
    /// dispatch to confirm the new state by polling.
    pub async fn refresh_now(&self) {
        self.inner.cycle.lock().await.force_next = true;
    }

    /// Cancel the polling loop and abort any in-flight request wait.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    // ── Scheduler ────────────────────────────────────────────────────

    /// Drive periodic refresh until cancelled.
    ///
    /// Returns `Ok(())` on shutdown. Returns `Err` only for the fatal
    /// re-authentication signal; everything else is absorbed into logs
    /// and stale data.
    pub async fn run(&self) -> Result<(), CoreError> {
        let cancel = self.inner.cancel.clone();
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    // Cancellation must abort in-flight waits promptly,
                    // not just between ticks.
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(()),
                        result = self.tick() => {
                            if let Err(err) = result {
                                warn!(error = %err, "polling stopped: re-authentication required");
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
    }

    /// One scheduler tick: run whichever cadences are due and publish
    /// the merged snapshot.
    pub async fn tick(&self) -> Result<(), CoreError> {
        let mut cycle = self.inner.cycle.lock().await;
        let now = Instant::now();
        let force = std::mem::take(&mut cycle.force_next);

        // A never-attempted cadence is always due (`last == None`); a
        // failed attempt still waits out its interval before retrying.
        let device_due =
            force || due(cycle.last_device_refresh, now, self.inner.polling.device_interval);
        let data_due =
            force || due(cycle.last_data_refresh, now, self.inner.polling.data_interval);

        if !device_due && !data_due {
            return Ok(());
        }

        let mut refreshed = false;

        if device_due {
            // Failed cycles also wait out the cadence before retrying.
            cycle.last_device_refresh = Some(now);
            match self.refresh_devices_and_states(&mut cycle).await {
                Ok(()) => refreshed = true,
                Err(CycleFailure::Fatal(err)) => return Err(err),
                Err(CycleFailure::Soft(err)) => {
                    warn!(error = %err, "device refresh cycle failed; keeping stale data");
                }
            }
        }

        if data_due && cycle.devices_loaded {
            cycle.last_data_refresh = Some(now);
            match self.refresh_telemetry(&mut cycle).await {
                Ok(()) => refreshed = true,
                Err(CycleFailure::Fatal(err)) => return Err(err),
                Err(CycleFailure::Soft(err)) => {
                    warn!(error = %err, "telemetry refresh cycle failed; keeping stale data");
                }
            }
        }

        if refreshed {
            self.publish(&cycle);
        }
        Ok(())
    }

    // ── Refresh cycles ───────────────────────────────────────────────

    /// Refresh the device list, then each device's state sequentially.
    async fn refresh_devices_and_states(
        &self,
        cycle: &mut CycleState,
    ) -> Result<(), CycleFailure> {
        let raw = match self.inner.client.list_devices().await {
            Ok(raw) => raw,
            // Without a device list there is nothing to poll: auth
            // failures are fatal here, everything else aborts the cycle
            // softly.
            Err(err) if err.is_auth() => {
                return Err(CycleFailure::Fatal(CoreError::AuthenticationRequired {
                    message: err.to_string(),
                }));
            }
            Err(err) => return Err(CycleFailure::Soft(err.into())),
        };

        let fresh: BTreeMap<String, Device> = normalize::parse_devices(&raw)
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        if !cycle.devices_loaded {
            info!(count = fresh.len(), "device list loaded");
        }

        // Devices that disappeared take their cached entries along.
        cycle.states.retain(|id, _| fresh.contains_key(id));
        cycle.telemetry.retain(|id, _| fresh.contains_key(id));
        cycle.devices = fresh;
        cycle.devices_loaded = true;

        let ids: Vec<String> = cycle.devices.keys().cloned().collect();
        for id in ids {
            let serial = cycle.devices.get(&id).and_then(Device::serial_number);
            match self.fetch_state(&id, serial.as_deref()).await {
                Ok(state) => {
                    cycle.states.insert(id, state);
                }
                Err(CycleFailure::Fatal(err)) => return Err(CycleFailure::Fatal(err)),
                Err(CycleFailure::Soft(err)) => {
                    warn!(device_id = %id, error = %err, "state refresh failed; keeping previous state");
                }
            }
        }

        debug!(
            devices = cycle.devices.len(),
            states = cycle.states.len(),
            "device refresh complete"
        );
        Ok(())
    }

    /// Refresh per-device telemetry with the same partial-failure
    /// tolerance as the state cycle.
    async fn refresh_telemetry(&self, cycle: &mut CycleState) -> Result<(), CycleFailure> {
        let ids: Vec<String> = cycle.devices.keys().cloned().collect();
        for id in ids {
            let serial = cycle.devices.get(&id).and_then(Device::serial_number);
            match self.fetch_telemetry(&id, serial.as_deref()).await {
                Ok(sample) => {
                    cycle.telemetry.insert(id, sample);
                }
                Err(CycleFailure::Fatal(err)) => return Err(CycleFailure::Fatal(err)),
                Err(CycleFailure::Soft(err)) => {
                    warn!(device_id = %id, error = %err, "telemetry refresh failed; keeping previous sample");
                }
            }
        }

        debug!(samples = cycle.telemetry.len(), "telemetry refresh complete");
        Ok(())
    }

    /// Fetch one device's state, retrying a 403-class rejection once
    /// with the serial-number attribute as the alternate identifier.
    async fn fetch_state(
        &self,
        device_id: &str,
        serial: Option<&str>,
    ) -> Result<NormalizedState, CycleFailure> {
        match self.inner.client.device_state(device_id).await {
            Ok(raw) => Ok(normalize::normalize_state(&raw)),
            Err(err) if err.is_not_authorized() => {
                let Some(serial) = serial.filter(|s| *s != device_id) else {
                    return Err(classify_device_error(err));
                };
                debug!(device_id, serial, "state not authorized; retrying with serial number");
                match self.inner.client.device_state(serial).await {
                    Ok(raw) => Ok(normalize::normalize_state(&raw)),
                    Err(err) => Err(classify_device_error(err)),
                }
            }
            Err(err) => Err(classify_device_error(err)),
        }
    }

    /// Telemetry twin of [`fetch_state`](Self::fetch_state).
    async fn fetch_telemetry(
        &self,
        device_id: &str,
        serial: Option<&str>,
    ) -> Result<TelemetrySample, CycleFailure> {
        match self.inner.client.latest_data(device_id).await {
            Ok(raw) => Ok(normalize::normalize_telemetry(&raw)),
            Err(err) if err.is_not_authorized() => {
                let Some(serial) = serial.filter(|s| *s != device_id) else {
                    return Err(classify_device_error(err));
                };
                debug!(device_id, serial, "telemetry not authorized; retrying with serial number");
                match self.inner.client.latest_data(serial).await {
                    Ok(raw) => Ok(normalize::normalize_telemetry(&raw)),
                    Err(err) => Err(classify_device_error(err)),
                }
            }
            Err(err) => Err(classify_device_error(err)),
        }
    }

    // ── Snapshot publication ─────────────────────────────────────────

    /// Assemble and atomically publish the merged snapshot.
    fn publish(&self, cycle: &CycleState) {
        let snapshot = Arc::new(Snapshot {
            devices: cycle.devices.clone(),
            states: cycle.states.clone(),
            telemetry: cycle.telemetry.clone(),
            refreshed_at: Some(Utc::now()),
        });
        self.inner.snapshot.store(Arc::clone(&snapshot));
        let _ = self.inner.snapshot_tx.send(snapshot);
    }
}

fn due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.is_none_or(|t| now.duration_since(t) >= interval)
}

/// Per-device error classification.
///
/// A 403-class rejection means this device is not visible to the
/// account under the tried identifier -- device-scoped, skip for this
/// cycle. Only credential-class failures force a re-login.
fn classify_device_error(err: fenix_api::Error) -> CycleFailure {
    if err.is_not_authorized() {
        CycleFailure::Soft(CoreError::Api {
            message: err.to_string(),
            status: Some(403),
        })
    } else if err.is_auth() {
        CycleFailure::Fatal(CoreError::AuthenticationRequired {
            message: err.to_string(),
        })
    } else {
        CycleFailure::Soft(err.into())
    }
}
