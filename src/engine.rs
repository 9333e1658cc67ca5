use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use smallvec::smallvec;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{Config, EngineConfig, MAX_TICK_INTERVAL_MS};
use crate::detector::AnomalyDetector;
use crate::error::EngineError;
use crate::history::HistoryBuffer;
use crate::registry::ZoneRegistry;
use crate::source::{self, ReadingSource};
use crate::types::{DetectionResult, EngineState, HistoryEntry, Label, Reading, SpikeAlert, Zone};

/// Runtime knobs for an engine instance
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub source_timeout: Duration,
    pub history_capacity: usize,
    pub initial_zone: Option<String>,
    pub hostname: String,
    /// Receives one alert per declared spike
    pub alert_tx: Option<mpsc::Sender<SpikeAlert>>,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            source_timeout: config.source_timeout(),
            history_capacity: config.history_capacity,
            initial_zone: config.initial_zone.clone(),
            hostname: config.hostname.clone(),
            alert_tx: None,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Counters describing the engine's activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub spikes: u64,
    pub missed_ticks: u64,
    pub zone_switches: u64,
}

/// Ingestion-and-detection engine for one set of zones.
///
/// All state changes go through a single writer lock shared by `tick` and
/// `switch_zone`, so a reading taken against one zone can never land in
/// the history of the next. Consumers read immutable snapshots through
/// [`Engine::snapshot`] or [`Engine::subscribe`] and never block a writer.
pub struct Engine {
    inner: Arc<Inner>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

struct Inner {
    registry: ZoneRegistry,
    detector: AnomalyDetector,
    tick_interval: Duration,
    source_timeout: Duration,
    hostname: String,
    alert_tx: Option<mpsc::Sender<SpikeAlert>>,
    core: Mutex<Core>,
    snapshot_tx: watch::Sender<Arc<EngineState>>,
    ticks: AtomicU64,
    spikes: AtomicU64,
    missed_ticks: AtomicU64,
    zone_switches: AtomicU64,
}

/// Mutable state, only touched while holding the writer lock
struct Core {
    source: Box<dyn ReadingSource>,
    active_zone: Zone,
    history: HistoryBuffer,
    latest: Option<DetectionResult>,
}

impl Core {
    fn snapshot(&self) -> Arc<EngineState> {
        Arc::new(EngineState {
            active_zone: self.active_zone.clone(),
            latest: self.latest.clone(),
            history: self.history.to_vec(),
        })
    }
}

struct Scheduler {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Engine {
    pub fn new(
        registry: ZoneRegistry,
        source: Box<dyn ReadingSource>,
        detector: AnomalyDetector,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let interval_ms = settings.tick_interval.as_millis();
        if interval_ms == 0 || interval_ms > MAX_TICK_INTERVAL_MS as u128 {
            return Err(EngineError::invalid(format!(
                "tick interval must be within 1..={} ms, got {} ms",
                MAX_TICK_INTERVAL_MS, interval_ms
            )));
        }
        if settings.source_timeout.is_zero() {
            return Err(EngineError::invalid("source timeout must be greater than zero"));
        }

        let history = HistoryBuffer::new(settings.history_capacity)?;
        let active_zone = match settings.initial_zone {
            Some(ref id) => registry
                .get(id)
                .cloned()
                .ok_or_else(|| EngineError::invalid(format!("initial zone '{}' is not configured", id)))?,
            None => registry.default_zone().clone(),
        };

        let core = Core {
            source,
            active_zone,
            history,
            latest: None,
        };
        let (snapshot_tx, _) = watch::channel(core.snapshot());

        info!(
            zones = registry.len(),
            active = %core.active_zone,
            source = core.source.name(),
            spike_ratio = detector.spike_ratio(),
            interval_ms = interval_ms as u64,
            capacity = settings.history_capacity,
            "Engine initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                detector,
                tick_interval: settings.tick_interval,
                source_timeout: settings.source_timeout,
                hostname: settings.hostname,
                alert_tx: settings.alert_tx,
                core: Mutex::new(core),
                snapshot_tx,
                ticks: AtomicU64::new(0),
                spikes: AtomicU64::new(0),
                missed_ticks: AtomicU64::new(0),
                zone_switches: AtomicU64::new(0),
            }),
            scheduler: Mutex::new(None),
        })
    }

    /// Build an engine from a validated configuration, using the configured
    /// reading source and detector
    pub fn from_config(
        config: &Config,
        alert_tx: Option<mpsc::Sender<SpikeAlert>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = config.registry()?;
        let source = source::create_source(&config.source)?;
        let detector = AnomalyDetector::from_config(&config.detector)?;
        let settings = EngineSettings {
            alert_tx,
            ..EngineSettings::from_config(&config.engine)
        };
        Ok(Self::new(registry, source, detector, settings)?)
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.inner.registry
    }

    /// Latest published state
    pub fn snapshot(&self) -> Arc<EngineState> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineState>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        let inner = &self.inner;
        EngineStats {
            ticks: inner.ticks.load(Ordering::Relaxed),
            spikes: inner.spikes.load(Ordering::Relaxed),
            missed_ticks: inner.missed_ticks.load(Ordering::Relaxed),
            zone_switches: inner.zone_switches.load(Ordering::Relaxed),
        }
    }

    /// Run one ingestion/detection cycle for the active zone
    pub async fn tick(&self) -> Result<Arc<EngineState>, EngineError> {
        self.inner.tick().await
    }

    /// Make `zone_id` the active zone and start a fresh history.
    ///
    /// Re-selecting the active zone also clears its history. An unknown id
    /// is rejected without touching any state.
    pub async fn switch_zone(&self, zone_id: &str) -> Result<Arc<EngineState>, EngineError> {
        self.inner.switch_zone(zone_id).await
    }

    /// Begin periodic ticking. Calling this on a running engine does nothing.
    pub async fn start(&self) {
        let mut slot = self.scheduler.lock().await;
        if slot.is_some() {
            warn!("Engine already running, ignoring start");
            return;
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let handle = tokio::spawn(run_scheduler(inner, shutdown_rx));
        *slot = Some(Scheduler { shutdown, handle });
        info!(interval_ms = self.inner.tick_interval.as_millis() as u64, "Engine started");
    }

    /// Cancel the periodic schedule and wait for any in-flight tick
    pub async fn stop(&self) {
        let Some(scheduler) = self.scheduler.lock().await.take() else {
            debug!("Engine not running, ignoring stop");
            return;
        };

        // The receiver may already be gone if the task died
        let _ = scheduler.shutdown.send(());
        if let Err(e) = scheduler.handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        info!(stats = ?self.stats(), "Engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_some()
    }
}

impl Inner {
    async fn tick(&self) -> Result<Arc<EngineState>, EngineError> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        let zone = core.active_zone.clone();

        let reading = match tokio::time::timeout(
            self.source_timeout,
            core.source.next_reading(&zone, &core.history),
        )
        .await
        {
            Ok(Ok(reading)) if reading.value.is_finite() => reading,
            Ok(Ok(reading)) => {
                return Err(self.missed_tick(core.source.name(), &zone, format!("non-finite reading {}", reading.value)));
            }
            Ok(Err(e)) => return Err(self.missed_tick(core.source.name(), &zone, format!("{:#}", e))),
            Err(_) => {
                let reason = format!("no reading within {} ms", self.source_timeout.as_millis());
                return Err(self.missed_tick(core.source.name(), &zone, reason));
            }
        };

        let result = self.detector.classify(&reading, &zone)?;

        core.history.push(HistoryEntry::capture(&reading, &zone));
        core.latest = Some(result.clone());
        let state = core.snapshot();
        self.snapshot_tx.send_replace(state.clone());
        self.ticks.fetch_add(1, Ordering::Relaxed);

        if result.spike_detected {
            self.spikes.fetch_add(1, Ordering::Relaxed);
            info!(
                zone = %zone.id,
                value = result.value,
                threshold = result.threshold,
                confidence = ?result.confidence,
                cause = %result.cause,
                "Spike detected"
            );
            self.raise_alert(&zone, &reading, &result);
        } else {
            debug!(zone = %zone.id, value = result.value, history = core.history.len(), "Reading within baseline");
        }

        Ok(state)
    }

    async fn switch_zone(&self, zone_id: &str) -> Result<Arc<EngineState>, EngineError> {
        let Some(zone) = self.registry.get(zone_id).cloned() else {
            return Err(EngineError::UnknownZone(zone_id.to_string()));
        };

        let mut core = self.core.lock().await;
        let previous = std::mem::replace(&mut core.active_zone, zone);
        let dropped = core.history.len();
        core.history.clear();

        let state = core.snapshot();
        self.snapshot_tx.send_replace(state.clone());
        self.zone_switches.fetch_add(1, Ordering::Relaxed);

        info!(from = %previous.id, to = %core.active_zone.id, dropped, "Switched active zone");
        Ok(state)
    }

    fn missed_tick(&self, source_name: &str, zone: &Zone, reason: String) -> EngineError {
        let missed = self.missed_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(source = source_name, zone = %zone.id, missed, reason = %reason, "Tick missed, keeping previous state");
        EngineError::SourceUnavailable {
            source_name: source_name.to_string(),
            reason,
        }
    }

    fn raise_alert(&self, zone: &Zone, reading: &Reading, result: &DetectionResult) {
        let (Some(tx), Some(confidence)) = (self.alert_tx.as_ref(), result.confidence) else {
            return;
        };

        let alert = SpikeAlert {
            timestamp: reading.timestamp,
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            value: result.value,
            threshold: result.threshold,
            confidence,
            cause: result.cause.clone(),
            authority: zone.authority.clone(),
            recommended_action: zone.recommended_action.clone(),
            hostname: self.hostname.clone(),
            labels: smallvec![Label {
                key: "category".into(),
                value: zone.category.to_string(),
            }],
        };

        match tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(zone = %zone.id, "Alert queue full, dropping spike alert");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(zone = %zone.id, "Alert receiver closed");
            }
        }
    }
}

async fn run_scheduler(inner: Arc<Inner>, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(inner.tick_interval);
    // A slow tick delays the next one instead of triggering a burst
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Also fires when the engine is dropped without stop()
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                // Ticks run inline, so they never overlap
                match inner.tick().await {
                    Ok(_) | Err(EngineError::SourceUnavailable { .. }) => {}
                    Err(e) => error!(error = %e, "Tick failed"),
                }
            }
        }
    }

    debug!("Scheduler loop exited");
}
