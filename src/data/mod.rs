//! Data models and processing for vital-sign samples.
//!
//! This module turns raw samples from a source into a consistent, aligned
//! window and the alerts derived from it.
//!
//! ## Submodules
//!
//! - [`timestamp`]: UTC reception times into the presentation time zone
//! - [`signal`]: Attributes, normalized [`Sample`]s and per-attribute [`SignalSeries`]
//! - [`window`]: The rolling [`SignalWindow`] and its published [`WindowSnapshot`]
//! - [`alert`]: Threshold rules and [`AlertState`]
//! - [`duration`]: Parsing of interval strings from configuration
//!
//! ## Data Flow
//!
//! ```text
//! RawSample (recvTime, attrValue)
//!        │
//!        ▼
//! SignalSeries::from_raw()  ── timestamp::normalize()
//!        │
//!        ▼
//! SignalWindow::replace() × attributes
//!        │
//!        ▼
//! SignalWindow::commit() ──▶ WindowSnapshot ──▶ alert::evaluate_snapshot()
//! ```

pub mod alert;
pub mod duration;
pub mod signal;
pub mod timestamp;
pub mod window;

pub use alert::{evaluate, evaluate_snapshot, AlertRule, AlertState, Severity};
pub use signal::{Attribute, Sample, SampleError, SignalSeries};
pub use timestamp::{normalize, TimestampError, DEFAULT_ZONE};
pub use window::{Alignment, SeriesSummary, SignalWindow, WindowError, WindowSnapshot};
