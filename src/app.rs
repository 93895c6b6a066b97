//! Poll cycle and published monitor state.
//!
//! [`App`] owns the window and is the only writer. Each cycle either replaces
//! the window and alerts as a whole or leaves them exactly as they were.
//! Readers hold a [`watch::Receiver`] and always see a complete
//! [`MonitorState`] from before or after a cycle, never a mix.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use vitalwatch_adapters::RawSample;

use crate::data::duration::format_duration;
use crate::data::{
    evaluate_snapshot, Alignment, AlertState, Attribute, SeriesSummary, SignalSeries,
    SignalWindow, WindowError, WindowSnapshot, DEFAULT_ZONE,
};
use crate::source::{FetchOutcome, SampleSource, Unavailable};

/// Runtime settings for the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Attributes fetched every cycle, in fetch order.
    pub tracked: Vec<Attribute>,
    /// Attribute whose timestamps form the shared time axis.
    pub reference: Attribute,
    pub last_n: usize,
    pub zone: Tz,
    pub alignment: Alignment,
    pub interval: Duration,
    /// Budget for all fetches of one cycle.
    pub cycle_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tracked: vec![Attribute::Bpm, Attribute::TemperatureC],
            reference: Attribute::Bpm,
            last_n: 30,
            zone: DEFAULT_ZONE,
            alignment: Alignment::default(),
            interval: Duration::from_secs(2),
            cycle_timeout: Duration::from_secs(8),
        }
    }
}

/// Where the poll loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
}

/// What a reader should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataStatus {
    /// No cycle has succeeded yet.
    NoData,
    /// The last cycle succeeded.
    Live,
    /// Data is present but the latest cycle failed.
    Stale,
}

/// State published to readers after every cycle.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub snapshot: Arc<WindowSnapshot>,
    pub alerts: Vec<AlertState>,
    /// Successful cycles so far.
    pub cycles: u64,
    pub updated_at: Option<DateTime<Tz>>,
    pub consecutive_failures: u32,
    pub last_failure: Option<String>,
}

impl MonitorState {
    fn initial(snapshot: Arc<WindowSnapshot>) -> Self {
        let alerts = evaluate_snapshot(&snapshot);
        Self {
            snapshot,
            alerts,
            cycles: 0,
            updated_at: None,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    pub fn status(&self) -> DataStatus {
        if self.snapshot.is_empty() {
            DataStatus::NoData
        } else if self.consecutive_failures > 0 {
            DataStatus::Stale
        } else {
            DataStatus::Live
        }
    }

    pub fn alert(&self, attribute: Attribute) -> Option<&AlertState> {
        self.alerts.iter().find(|a| a.attribute == attribute)
    }

    pub fn active_alerts(&self) -> impl Iterator<Item = &AlertState> {
        self.alerts.iter().filter(|a| a.is_active())
    }

    pub fn summaries(&self) -> Vec<SeriesSummary> {
        self.snapshot
            .attributes()
            .filter_map(|a| self.snapshot.summary(a))
            .collect()
    }

    /// Pretty JSON view for export.
    pub fn to_json(&self, source: &str) -> serde_json::Result<String> {
        let value = serde_json::json!({
            "source": source,
            "status": self.status(),
            "cycles": self.cycles,
            "updated_at": self.updated_at.map(|t| t.to_rfc3339()),
            "consecutive_failures": self.consecutive_failures,
            "last_failure": self.last_failure,
            "summaries": self.summaries(),
            "alerts": self.alerts,
            "window": &*self.snapshot,
        });
        serde_json::to_string_pretty(&value)
    }
}

/// Why a cycle left the window untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unavailable {
        attribute: Attribute,
        reason: Unavailable,
    },
    Rejected(WindowError),
    TimedOut(Duration),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unavailable { attribute, reason } => write!(f, "{}: {}", attribute, reason),
            SkipReason::Rejected(err) => write!(f, "rejected: {}", err),
            SkipReason::TimedOut(budget) => write!(f, "fetches exceeded {:?}", budget),
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Updated { samples: usize },
    Skipped(SkipReason),
}

impl CycleOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, CycleOutcome::Updated { .. })
    }
}

/// A change in an attribute's alert between two published states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTransition {
    Raised(AlertState),
    Cleared(Attribute),
}

/// Compare alerts of consecutive states.
pub fn alert_transitions(previous: &[AlertState], current: &[AlertState]) -> Vec<AlertTransition> {
    current
        .iter()
        .filter_map(|alert| {
            let before = previous.iter().find(|p| p.attribute == alert.attribute);
            let was_active = before.is_some_and(|p| p.is_active());
            if alert.is_active() {
                let unchanged = before.is_some_and(|p| p.message == alert.message);
                (!unchanged).then(|| AlertTransition::Raised(alert.clone()))
            } else {
                was_active.then_some(AlertTransition::Cleared(alert.attribute))
            }
        })
        .collect()
}

/// The poll-cycle orchestrator.
pub struct App {
    source: Box<dyn SampleSource>,
    window: SignalWindow,
    settings: MonitorSettings,
    cycle_state: CycleState,
    state: Arc<MonitorState>,
    publisher: watch::Sender<Arc<MonitorState>>,
}

impl App {
    /// Create an App with the given source and settings.
    pub fn new(source: Box<dyn SampleSource>, settings: MonitorSettings) -> Result<Self, WindowError> {
        let window = SignalWindow::new(
            settings.tracked.clone(),
            settings.reference,
            settings.last_n,
            settings.alignment,
        )?;
        let state = Arc::new(MonitorState::initial(window.snapshot()));
        let (publisher, _) = watch::channel(Arc::clone(&state));

        Ok(Self {
            source,
            window,
            settings,
            cycle_state: CycleState::Idle,
            state,
            publisher,
        })
    }

    /// Receive every published state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorState>> {
        self.publisher.subscribe()
    }

    /// The most recently published state.
    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle_state
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Returns a description of the current data source.
    pub fn source_description(&self) -> &str {
        self.source.description()
    }

    /// Run one fetch → normalize → commit → evaluate cycle and publish.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycle_state = CycleState::Fetching;
        let outcome = self.poll().await;
        self.cycle_state = CycleState::Idle;

        let previous = &self.state;
        let next = match &outcome {
            CycleOutcome::Updated { .. } => {
                let snapshot = self.window.snapshot();
                let alerts = evaluate_snapshot(&snapshot);
                MonitorState {
                    snapshot,
                    alerts,
                    cycles: previous.cycles + 1,
                    updated_at: Some(Utc::now().with_timezone(&self.settings.zone)),
                    consecutive_failures: 0,
                    last_failure: None,
                }
            }
            CycleOutcome::Skipped(reason) => {
                self.window.discard();
                MonitorState {
                    consecutive_failures: previous.consecutive_failures.saturating_add(1),
                    last_failure: Some(reason.to_string()),
                    ..MonitorState::clone(previous)
                }
            }
        };

        self.state = Arc::new(next);
        self.publisher.send_replace(Arc::clone(&self.state));
        outcome
    }

    async fn poll(&mut self) -> CycleOutcome {
        let budget = self.settings.cycle_timeout;
        let fetched = match tokio::time::timeout(budget, self.fetch_all()).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(reason)) => return CycleOutcome::Skipped(reason),
            Err(_) => return CycleOutcome::Skipped(SkipReason::TimedOut(budget)),
        };

        for (attribute, raw) in &fetched {
            let staged = SignalSeries::from_raw(*attribute, raw, self.settings.zone)
                .and_then(|series| self.window.replace(series));
            if let Err(err) = staged {
                return CycleOutcome::Skipped(SkipReason::Rejected(err));
            }
        }

        match self.window.commit() {
            Ok(snapshot) => CycleOutcome::Updated {
                samples: snapshot.len(),
            },
            Err(err) => CycleOutcome::Skipped(SkipReason::Rejected(err)),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<(Attribute, Vec<RawSample>)>, SkipReason> {
        let mut fetched = Vec::with_capacity(self.settings.tracked.len());
        for &attribute in &self.settings.tracked {
            match self.source.fetch(attribute, self.settings.last_n).await {
                FetchOutcome::Samples(samples) => fetched.push((attribute, samples)),
                FetchOutcome::Unavailable(reason) => {
                    return Err(SkipReason::Unavailable { attribute, reason })
                }
            }
        }
        Ok(fetched)
    }

    /// Poll on the configured interval until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            source = %self.source_description(),
            interval = %format_duration(self.settings.interval),
            last_n = self.window.last_n(),
            attributes = ?self.window.tracked(),
            reference = %self.window.reference(),
            "Starting poll loop",
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(cycles = self.state.cycles, "Shutting down poll loop");
                    break;
                }
                _ = ticker.tick() => {
                    let previous = self.state();
                    let outcome = self.run_cycle().await;
                    self.log_cycle(&previous, &outcome);
                }
            }
        }
    }

    fn log_cycle(&self, previous: &MonitorState, outcome: &CycleOutcome) {
        let current = &self.state;
        match outcome {
            CycleOutcome::Updated { samples } => {
                if previous.consecutive_failures > 0 {
                    tracing::info!(
                        failed_cycles = previous.consecutive_failures,
                        "Source recovered",
                    );
                }
                for summary in current.summaries() {
                    tracing::debug!(
                        attribute = %summary.attribute,
                        latest = summary.latest,
                        mean = summary.mean,
                        samples,
                        "Window updated",
                    );
                }
            }
            CycleOutcome::Skipped(reason) => {
                // Warn once per failure streak.
                if current.consecutive_failures == 1 {
                    tracing::warn!(%reason, status = ?current.status(), "Cycle skipped, keeping previous window");
                } else {
                    tracing::debug!(%reason, failures = current.consecutive_failures, "Cycle skipped");
                }
            }
        }

        for transition in alert_transitions(&previous.alerts, &current.alerts) {
            match transition {
                AlertTransition::Raised(alert) => tracing::warn!(
                    attribute = %alert.attribute,
                    message = %alert.message,
                    latest = ?current.snapshot.latest(alert.attribute),
                    "Alert raised",
                ),
                AlertTransition::Cleared(attribute) => {
                    tracing::info!(%attribute, "Alert cleared")
                }
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("source", &self.source.description())
            .field("cycle_state", &self.cycle_state)
            .field("cycles", &self.state.cycles)
            .finish()
    }
}
