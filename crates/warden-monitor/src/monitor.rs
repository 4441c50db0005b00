//! Monitor loop: the periodic fetch → diff → attribute → notify pipeline.
//!
//! Each tick moves through `Idle → Fetching → Diffing → Reporting → Idle` and
//! ends in one of three outcomes:
//!
//! - **NewErrors**: mismatches appeared that were absent last cycle. The
//!   cropped canvas is broadcast, every current mismatch is attributed and the
//!   new ones are merged into the ledger (except on the baseline cycle).
//! - **ErrorsCleared**: the previous cycle had mismatches and this one has
//!   none. A cleared notice is broadcast.
//! - **NoChange**: nothing is sent and the ledger is untouched.
//!
//! The previous mismatch set is replaced by the current one after every
//! successful tick. A failed fetch leaves it untouched.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use image::RgbaImage;
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use warden_types::{ErrorPixelSet, MonitorEvent};

use crate::attribution::AttributionService;
use crate::canvas::{OwnerLookup, TileSource};
use crate::config::MonitorConfig;
use crate::diff;
use crate::error::{MonitorError, MonitorResult};
use crate::notifier::{broadcast_image, broadcast_text, Notifier, OutgoingImage};
use crate::report;
use crate::stats::StatsStore;
use crate::template::TemplateStore;

/// Whether the first cycle with mismatches has been seen.
///
/// Mismatches present on the canvas when the process starts were most likely
/// tallied by an earlier run, so the first cycle that reports mismatches only
/// establishes the baseline and does not touch the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineState {
    NotYetBaselined,
    Baselined,
}

impl BaselineState {
    pub fn initial(suppress_first_cycle: bool) -> Self {
        if suppress_first_cycle {
            BaselineState::NotYetBaselined
        } else {
            BaselineState::Baselined
        }
    }

    /// Consume a NewErrors cycle. Returns whether its counts may be merged.
    pub fn observe_new_errors(&mut self) -> bool {
        match self {
            BaselineState::NotYetBaselined => {
                *self = BaselineState::Baselined;
                false
            }
            BaselineState::Baselined => true,
        }
    }
}

/// Stage of the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Diffing,
    Reporting,
}

/// How a successful tick ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    NoChange {
        mismatches: usize,
    },
    NewErrors {
        mismatches: usize,
        new_errors: usize,
        offenders: usize,
        merged: bool,
    },
    ErrorsCleared {
        previous: usize,
    },
}

/// Snapshot of the loop's progress.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub phase: CyclePhase,
    pub baseline: BaselineState,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub current_mismatches: usize,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl MonitorStatus {
    fn new(baseline: BaselineState) -> Self {
        Self {
            phase: CyclePhase::Idle,
            baseline,
            cycles: 0,
            consecutive_failures: 0,
            current_mismatches: 0,
            last_outcome: None,
            last_error: None,
            last_cycle_at: None,
        }
    }
}

/// Read-only view of the latest mismatch set.
#[derive(Debug, Clone, Default)]
pub struct MismatchView(Arc<RwLock<ErrorPixelSet>>);

impl MismatchView {
    pub async fn snapshot(&self) -> ErrorPixelSet {
        self.0.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }
}

/// Cloneable handle for observers of a running loop.
#[derive(Clone)]
pub struct MonitorHandle {
    mismatches: MismatchView,
    status: Arc<RwLock<MonitorStatus>>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorHandle {
    pub fn mismatches(&self) -> MismatchView {
        self.mismatches.clone()
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }
}

/// The periodic monitor.
///
/// Owns the previous-cycle mismatch set exclusively; observers only read it
/// through [`MismatchView`].
pub struct MonitorLoop {
    config: MonitorConfig,
    template: Arc<TemplateStore>,
    tiles: Arc<dyn TileSource>,
    attribution: AttributionService,
    stats: Arc<StatsStore>,
    notifier: Arc<dyn Notifier>,
    previous: Arc<RwLock<ErrorPixelSet>>,
    baseline: BaselineState,
    cycle: u64,
    status: Arc<RwLock<MonitorStatus>>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorLoop {
    pub fn new(
        config: MonitorConfig,
        template: Arc<TemplateStore>,
        tiles: Arc<dyn TileSource>,
        owners: Arc<dyn OwnerLookup>,
        stats: Arc<StatsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> MonitorResult<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(256);
        let baseline = BaselineState::initial(config.suppress_first_cycle);
        let attribution = AttributionService::new(
            owners,
            config.region,
            config.lookup_concurrency,
            config.request_timeout,
        );

        Ok(Self {
            config,
            template,
            tiles,
            attribution,
            stats,
            notifier,
            previous: Arc::new(RwLock::new(ErrorPixelSet::new())),
            baseline,
            cycle: 0,
            status: Arc::new(RwLock::new(MonitorStatus::new(baseline))),
            event_tx,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            mismatches: MismatchView(self.previous.clone()),
            status: self.status.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    pub fn baseline(&self) -> BaselineState {
        self.baseline
    }

    /// Run ticks every `tick_interval` until `shutdown` flips to true.
    ///
    /// A tick in progress always completes before the loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            region = %self.config.region,
            interval_secs = self.config.tick_interval.as_secs(),
            "Monitor loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(cycles = self.cycle, "Monitor loop stopped");
    }

    /// Run one cycle, containing any failure at the cycle boundary.
    ///
    /// A panic inside the cycle is recorded as a failed cycle like any other
    /// error.
    pub async fn tick(&mut self) -> Option<CycleOutcome> {
        let result = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(MonitorError::CyclePanic(panic_message(payload.as_ref()))),
        };
        let cycle = self.cycle;
        let current_mismatches = self.previous.read().await.len();

        let mut status = self.status.write().await;
        status.phase = CyclePhase::Idle;
        status.cycles = cycle;
        status.baseline = self.baseline;
        status.last_cycle_at = Some(Utc::now());

        match result {
            Ok(outcome) => {
                status.consecutive_failures = 0;
                status.current_mismatches = current_mismatches;
                status.last_outcome = Some(outcome.clone());
                status.last_error = None;
                drop(status);

                self.emit(outcome_event(cycle, &outcome));
                Some(outcome)
            }
            Err(e) => {
                status.consecutive_failures += 1;
                status.last_error = Some(e.to_string());
                let failures = status.consecutive_failures;
                drop(status);

                if e.is_transient() {
                    warn!(cycle, failures, error = %e, "Cycle skipped");
                } else {
                    error!(cycle, failures, error = %e, "Cycle failed");
                }
                self.emit(MonitorEvent::CycleFailed {
                    cycle,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    async fn run_cycle(&mut self) -> MonitorResult<CycleOutcome> {
        self.cycle += 1;
        let cycle = self.cycle;
        self.emit(MonitorEvent::CycleStarted { cycle });

        self.set_phase(CyclePhase::Fetching).await;
        let template = self.template.load().await?;
        let tile = self.fetch_tile().await?;

        self.set_phase(CyclePhase::Diffing).await;
        let current = diff::compare(&template, &tile, self.config.offset);
        let previous = self.previous.read().await.clone();
        let new_errors = current.difference(&previous);
        info!(
            mismatches = current.len(),
            new_errors = new_errors.len(),
            "Compared canvas against template"
        );

        self.set_phase(CyclePhase::Reporting).await;
        let outcome = if !new_errors.is_empty() {
            self.report_new_errors(&template, &tile, &current, &previous, new_errors.len())
                .await
        } else if current.is_empty() && !previous.is_empty() {
            info!(previous = previous.len(), "All error pixels cleared");
            broadcast_text(self.notifier.as_ref(), report::CLEARED_NOTICE).await;
            CycleOutcome::ErrorsCleared {
                previous: previous.len(),
            }
        } else {
            debug!("No new error pixels");
            CycleOutcome::NoChange {
                mismatches: current.len(),
            }
        };

        *self.previous.write().await = current;
        Ok(outcome)
    }

    async fn fetch_tile(&self) -> MonitorResult<RgbaImage> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.tiles.fetch_tile(self.config.region)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::Timeout {
                operation: "tile fetch",
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn report_new_errors(
        &mut self,
        template: &RgbaImage,
        tile: &RgbaImage,
        current: &ErrorPixelSet,
        previous: &ErrorPixelSet,
        new_errors: usize,
    ) -> CycleOutcome {
        let caption = report::alert_caption(current.len());
        let cropped = diff::crop_to_template(tile, template, self.config.offset);
        match diff::encode_png(&cropped) {
            Ok(png) => {
                let image = OutgoingImage::png(report::ALERT_IMAGE_NAME, png);
                broadcast_image(self.notifier.as_ref(), &image, &caption).await;
            }
            Err(e) => {
                warn!(error = %e, "Could not encode alert image, sending text only");
                broadcast_text(self.notifier.as_ref(), &caption).await;
            }
        }

        let attribution = self.attribution.attribute(current, previous).await;

        let merged = self.baseline.observe_new_errors();
        if !merged {
            info!(
                new_users = attribution.new.users.len(),
                "Baseline cycle, counts are informational only"
            );
            self.emit(MonitorEvent::Baselined { cycle: self.cycle });
        } else if !attribution.new.is_empty() {
            if let Err(e) = self.stats.merge(&attribution.new).await {
                error!(error = %e, "Ledger update not persisted");
            }
        }

        let summary = report::offender_summary(&attribution.totals);
        broadcast_text(self.notifier.as_ref(), &summary).await;

        CycleOutcome::NewErrors {
            mismatches: current.len(),
            new_errors,
            offenders: attribution.totals.offender_count(),
            merged,
        }
    }

    async fn set_phase(&self, phase: CyclePhase) {
        self.status.write().await.phase = phase;
    }

    fn emit(&self, event: MonitorEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn outcome_event(cycle: u64, outcome: &CycleOutcome) -> MonitorEvent {
    match *outcome {
        CycleOutcome::NoChange { mismatches } => MonitorEvent::NoChange { cycle, mismatches },
        CycleOutcome::NewErrors {
            mismatches,
            new_errors,
            offenders,
            merged,
        } => MonitorEvent::NewErrors {
            cycle,
            mismatches,
            new_errors,
            offenders,
            merged,
        },
        CycleOutcome::ErrorsCleared { .. } => MonitorEvent::ErrorsCleared { cycle },
    }
}
