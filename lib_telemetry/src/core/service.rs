//! # Event Queue & Delivery Engine
//!
//! `TelemetryService` accepts tracking calls, keeps an at-least-once delivery
//! queue mirrored to the storage adapter, and flushes it to the ingest
//! endpoint in batches.
//!
//! ## Lifecycle
//!
//! `Uninitialized → Initializing → Ready → Destroyed`. Tracking calls outside
//! `Ready` are no-ops, as are all calls on a disabled engine. Telemetry never
//! surfaces an error to the host once the engine is built.
//!
//! ## Delivery
//!
//! - `track` appends, persists the whole queue, and flushes inline when the
//!   queue reaches `batch_size`.
//! - A background task flushes every `flush_interval_ms`.
//! - A flush swaps the queue out, persists the empty queue, sends each event
//!   in FIFO order, puts failures back at the front of the queue, and
//!   persists again.
//!
//! ## Concurrency
//!
//! The queue lives behind one async mutex and is persisted while that mutex
//! is held, so the stored snapshot always matches the in-memory order.
//! Flushes are serialized by a second mutex taken before the queue mutex;
//! the timer and the size trigger never run two flushes at once. Network
//! sends happen with the queue unlocked.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::adapters::{PlatformAdapter, StorageAdapter, StorageError};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{ConfigError, TelemetryConfig};
use crate::core::event::{
    Metadata, PerformanceMetric, ScreenViewEvent, TelemetryEvent, SCREEN_VIEW, SCREEN_VIEW_END,
};
use crate::core::session::{SessionIdentity, QUEUE_KEY};
use crate::core::transport::{HttpTransport, IngestPath, Transport, TransportError};

/// Unit used by `track_performance` when none is given.
pub const DEFAULT_PERFORMANCE_UNIT: &str = "ms";

/// Errors raised while building an engine. Nothing after construction fails.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be built.
    #[error("Transport setup failed: {0}")]
    Transport(String),

    /// A storage backend could not be opened.
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, `initialize` not yet called.
    Uninitialized,
    /// `initialize` in progress.
    Initializing,
    /// Accepting tracking calls.
    Ready,
    /// `destroy` has run. `initialize` may be called again.
    Destroyed,
}

/// Outcome of one flush, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Events accepted by the endpoint.
    pub delivered: usize,
    /// Events put back on the queue.
    pub requeued: usize,
    /// Events discarded as non-retryable.
    pub dropped: usize,
}

struct EngineState {
    lifecycle: Lifecycle,
    identity: Option<SessionIdentity>,
    queue: VecDeque<TelemetryEvent>,
    /// Screen name → start timestamp (ms) of the current view.
    screen_starts: HashMap<String, i64>,
}

struct Inner {
    config: TelemetryConfig,
    storage: Arc<dyn StorageAdapter>,
    platform: Arc<dyn PlatformAdapter>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    flush_gate: Mutex<()>,
    /// Cancels the periodic flush when replaced, taken, or dropped.
    timer: StdMutex<Option<DropGuard>>,
}

/// Handle to a delivery engine. Cloning is cheap and every clone drives the
/// same queue. Dropping the last handle stops the periodic flush.
#[derive(Clone)]
pub struct TelemetryService {
    inner: Arc<Inner>,
}

impl TelemetryService {
    /// Builds an engine posting over HTTP to `config.api_endpoint`.
    pub fn new(
        config: TelemetryConfig,
        storage: Arc<dyn StorageAdapter>,
        platform: Arc<dyn PlatformAdapter>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        let transport =
            HttpTransport::new(&config).map_err(|e| TelemetryError::Transport(format!("{:#}", e)))?;
        Self::with_parts(
            config,
            storage,
            platform,
            Arc::new(transport),
            Arc::new(SystemClock),
        )
    }

    /// Builds an engine from explicit parts.
    pub fn with_parts(
        config: TelemetryConfig,
        storage: Arc<dyn StorageAdapter>,
        platform: Arc<dyn PlatformAdapter>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                storage,
                platform,
                transport,
                clock,
                state: Mutex::new(EngineState {
                    lifecycle: Lifecycle::Uninitialized,
                    identity: None,
                    queue: VecDeque::new(),
                    screen_starts: HashMap::new(),
                }),
                flush_gate: Mutex::new(()),
                timer: StdMutex::new(None),
            }),
        })
    }

    /// Loads or creates the user id, mints a session id, recovers any
    /// persisted queue, and starts the periodic flush. A no-op when already
    /// `Ready`.
    pub async fn initialize(&self) {
        self.inner.initialize().await;
    }

    /// Queues a generic event. Flushes inline once the queue reaches the
    /// batch size.
    pub async fn track(&self, event_type: &str, metadata: Option<Metadata>, screen_name: Option<&str>) {
        self.inner
            .track(event_type, metadata, screen_name.map(str::to_string))
            .await;
    }

    /// Records the start of a screen view and queues a `screen_view` event.
    pub async fn track_screen_view(&self, screen_name: &str, properties: Option<Metadata>) {
        self.inner.track_screen_view(screen_name, properties).await;
    }

    /// Queues a `screen_view_end` event with the time since the matching
    /// `track_screen_view`. Silently does nothing without a matching start.
    pub async fn track_screen_end(&self, screen_name: &str) {
        self.inner.track_screen_end(screen_name).await;
    }

    /// Sends a performance metric right away, bypassing the queue. Failures
    /// are logged and swallowed. `unit` defaults to `ms`.
    pub async fn track_performance(
        &self,
        metric_name: &str,
        value: f64,
        unit: Option<&str>,
        context: Option<Metadata>,
    ) {
        self.inner
            .track_performance(metric_name, value, unit, context)
            .await;
    }

    /// Delivers everything queued. A no-op on an empty queue.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush().await
    }

    /// Stops the periodic flush, attempts one last flush (awaited for at most
    /// `shutdown_timeout_ms`; it keeps running in the background past that),
    /// and leaves the engine `Destroyed`. Safe to call repeatedly.
    pub async fn destroy(&self) {
        self.inner.stop_timer();

        let inner = Arc::clone(&self.inner);
        let final_flush = tokio::spawn(async move { inner.flush().await });
        match tokio::time::timeout(self.inner.config.shutdown_timeout(), final_flush).await {
            Ok(Ok(report)) => log::debug!("Final flush finished: {:?}", report),
            Ok(Err(e)) => log::error!("Final flush task failed: {}", e),
            Err(_) => log::warn!(
                "Final flush still running after {} ms; leaving it in the background",
                self.inner.config.shutdown_timeout_ms
            ),
        }

        let mut state = self.inner.state.lock().await;
        state.screen_starts.clear();
        if state.lifecycle != Lifecycle::Destroyed {
            state.lifecycle = Lifecycle::Destroyed;
            log::info!("Telemetry destroyed ({} events still queued)", state.queue.len());
        }
    }

    /// Whether the engine is `Ready`.
    pub async fn is_initialized(&self) -> bool {
        self.inner.state.lock().await.lifecycle == Lifecycle::Ready
    }

    /// Current lifecycle stage.
    pub async fn lifecycle(&self) -> Lifecycle {
        self.inner.state.lock().await.lifecycle
    }

    /// Durable user id, once initialized.
    pub async fn user_id(&self) -> Option<String> {
        let state = self.inner.state.lock().await;
        state.identity.as_ref().map(|i| i.user_id.clone())
    }

    /// Session id of the current run, once initialized.
    pub async fn session_id(&self) -> Option<String> {
        let state = self.inner.state.lock().await;
        state.identity.as_ref().map(|i| i.session_id.clone())
    }

    /// Copy of the queue in delivery order.
    pub async fn pending_events(&self) -> Vec<TelemetryEvent> {
        self.inner.state.lock().await.queue.iter().cloned().collect()
    }

    /// Number of queued events.
    pub async fn queue_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn initialize(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.lifecycle == Lifecycle::Ready {
            return;
        }
        state.lifecycle = Lifecycle::Initializing;

        if !self.config.enabled {
            state.lifecycle = Lifecycle::Ready;
            log::info!("Telemetry disabled");
            return;
        }

        let identity = SessionIdentity::bootstrap(self.storage.as_ref()).await;

        // After a destroy the in-memory queue is authoritative; the stored
        // snapshot mirrors it.
        if state.queue.is_empty() {
            state.queue = self.load_queue().await;
        }
        let evicted = self.enforce_capacity(&mut state.queue);
        if evicted > 0 {
            self.persist(&state.queue).await;
        }

        log::info!(
            "Telemetry initialized (user={}, session={}, platform={}, version={}, recovered={})",
            identity.user_id,
            identity.session_id,
            self.platform.platform(),
            self.platform.app_version(),
            state.queue.len()
        );
        state.identity = Some(identity);
        state.lifecycle = Lifecycle::Ready;
        self.start_timer();
    }

    async fn track(&self, event_type: &str, metadata: Option<Metadata>, screen_name: Option<String>) {
        if !self.config.enabled {
            return;
        }
        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Ready {
            return;
        }
        let Some(identity) = state.identity.as_ref() else {
            return;
        };

        let event = TelemetryEvent {
            event_type: event_type.to_string(),
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            screen_name,
            metadata,
            timestamp: self.clock.now_ms(),
            platform: self.platform.platform().to_string(),
            app_version: self.platform.app_version(),
        };
        state.queue.push_back(event);
        self.enforce_capacity(&mut state.queue);
        self.persist(&state.queue).await;

        let should_flush = state.queue.len() >= self.config.batch_size;
        drop(state);

        if should_flush {
            self.flush().await;
        }
    }

    async fn track_screen_view(&self, screen_name: &str, properties: Option<Metadata>) {
        if !self.config.enabled {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if state.lifecycle != Lifecycle::Ready {
                return;
            }
            state
                .screen_starts
                .insert(screen_name.to_string(), self.clock.now_ms());
        }

        let mut metadata = Metadata::new();
        metadata.insert("screenName".into(), Value::from(screen_name));
        if let Some(properties) = properties {
            metadata.extend(properties);
        }
        self.track(SCREEN_VIEW, Some(metadata), Some(screen_name.to_string()))
            .await;
    }

    async fn track_screen_end(&self, screen_name: &str) {
        let started = self.state.lock().await.screen_starts.remove(screen_name);
        let Some(started) = started else {
            return;
        };

        let duration = (self.clock.now_ms() - started).max(0);
        let mut metadata = Metadata::new();
        metadata.insert("screenName".into(), Value::from(screen_name));
        metadata.insert("duration".into(), Value::from(duration));
        self.track(SCREEN_VIEW_END, Some(metadata), Some(screen_name.to_string()))
            .await;
    }

    async fn track_performance(
        &self,
        metric_name: &str,
        value: f64,
        unit: Option<&str>,
        context: Option<Metadata>,
    ) {
        if !self.config.enabled {
            return;
        }
        let identity = {
            let state = self.state.lock().await;
            if state.lifecycle != Lifecycle::Ready {
                return;
            }
            match state.identity.clone() {
                Some(identity) => identity,
                None => return,
            }
        };

        let metric = PerformanceMetric {
            metric_name: metric_name.to_string(),
            user_id: identity.user_id,
            session_id: identity.session_id,
            value,
            unit: unit.unwrap_or(DEFAULT_PERFORMANCE_UNIT).to_string(),
            context,
            timestamp: self.clock.now_ms(),
        };

        let sent = match serde_json::to_value(&metric) {
            Ok(payload) => self.transport.send(IngestPath::Performance, payload).await,
            Err(e) => Err(TransportError::Encode(e)),
        };
        match sent {
            Ok(()) => log::debug!("Performance metric sent: {}", metric_name),
            Err(e) => log::warn!("Failed to send performance metric {}: {}", metric_name, e),
        }
    }

    async fn flush(&self) -> FlushReport {
        let _gate = self.flush_gate.lock().await;

        let batch: Vec<TelemetryEvent> = {
            let mut state = self.state.lock().await;
            if state.queue.is_empty() {
                return FlushReport::default();
            }
            let batch = Vec::from(std::mem::take(&mut state.queue));
            // Optimistic removal: the snapshot is cleared before sending.
            self.persist(&state.queue).await;
            batch
        };

        let mut report = FlushReport::default();
        let mut failed = Vec::new();
        for event in batch {
            match self.deliver(&event).await {
                Ok(()) => {
                    report.delivered += 1;
                    log::debug!("Event sent: {}", event.event_type);
                }
                Err(e) if self.config.drop_rejected_events && !e.is_retryable() => {
                    report.dropped += 1;
                    log::error!("Dropping event {} rejected by ingest: {}", event.event_type, e);
                }
                Err(e) => {
                    log::warn!("Failed to send event {}, re-queueing: {}", event.event_type, e);
                    failed.push(event);
                }
            }
        }
        report.requeued = failed.len();

        {
            let mut state = self.state.lock().await;
            // Failures go back ahead of anything tracked meanwhile, in order.
            for event in failed.into_iter().rev() {
                state.queue.push_front(event);
            }
            self.enforce_capacity(&mut state.queue);
            self.persist(&state.queue).await;
        }

        log::info!(
            "Flush complete: {} delivered, {} re-queued, {} dropped",
            report.delivered,
            report.requeued,
            report.dropped
        );
        report
    }

    async fn deliver(&self, event: &TelemetryEvent) -> Result<(), TransportError> {
        if event.is_screen_view() {
            let payload = serde_json::to_value(ScreenViewEvent::from(event))?;
            self.transport.send(IngestPath::ScreenView, payload).await
        } else {
            let payload = serde_json::to_value(event)?;
            self.transport.send(IngestPath::Event, payload).await
        }
    }

    /// Drops the oldest events beyond `max_queue_size`. Returns how many.
    fn enforce_capacity(&self, queue: &mut VecDeque<TelemetryEvent>) -> usize {
        let Some(max) = self.config.max_queue_size else {
            return 0;
        };
        let excess = queue.len().saturating_sub(max);
        if excess > 0 {
            queue.drain(..excess);
            log::warn!("Queue exceeded {} events; dropped the {} oldest", max, excess);
        }
        excess
    }

    async fn persist(&self, queue: &VecDeque<TelemetryEvent>) {
        let json = match serde_json::to_string(queue) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize queue: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(QUEUE_KEY, &json).await {
            log::error!("Failed to persist queue: {}", e);
        }
    }

    async fn load_queue(&self) -> VecDeque<TelemetryEvent> {
        match self.storage.get(QUEUE_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<VecDeque<TelemetryEvent>>(&json) {
                Ok(queue) => queue,
                Err(e) => {
                    log::error!("Failed to parse persisted queue, discarding it: {}", e);
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                log::error!("Failed to load persisted queue: {}", e);
                VecDeque::new()
            }
        }
    }

    fn start_timer(self: &Arc<Self>) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let weak: Weak<Inner> = Arc::downgrade(self);
        let period = self.config.flush_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.flush().await;
                    }
                }
            }
            log::debug!("Flush timer stopped");
        });

        // Replacing a previous guard cancels its timer.
        let mut slot = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token.drop_guard());
    }

    fn stop_timer(&self) {
        let guard = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(guard);
    }
}
