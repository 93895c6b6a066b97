//! # vitalwatch
//!
//! A vital-sign monitor for patients wired to IoT sensors behind a FIWARE
//! STH-Comet historical store.
//!
//! Every few seconds the monitor pulls the most recent readings of each tracked
//! signal (heart rate plus temperature or SpO2), converts their UTC reception
//! times to the local clinical time zone, keeps them as an aligned rolling
//! window and raises threshold alerts on the latest values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           App                                │
//! │  ┌─────────┐    ┌──────────┐    ┌──────────┐    ┌─────────┐ │
//! │  │ source  │───▶│   data   │───▶│  alerts  │───▶│ watch:: │ │
//! │  │ (fetch) │    │ (window) │    │          │    │ Receiver│ │
//! │  └────┬────┘    └──────────┘    └──────────┘    └─────────┘ │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  SthSource | FileSource                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`app`]**: The poll cycle and the [`MonitorState`] it publishes
//! - **[`source`]**: Data source abstraction ([`SampleSource`] trait) with an
//!   STH-Comet implementation and a replay-from-disk implementation
//! - **[`data`]**: Timestamp normalization, the aligned [`SignalWindow`] and
//!   threshold alerts
//! - **[`config`]**: Layered [`Settings`] from defaults, a TOML file and the
//!   environment
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Monitor the default entity on a local STH-Comet
//! vitalwatch --endpoint http://localhost:8666 --entity-id urn:ngsi-ld:bpm:032
//!
//! # SpO2 deployment variant, 20 samples per signal
//! vitalwatch --secondary spo2 --last-n 20
//!
//! # Replay recorded responses and export one cycle
//! vitalwatch --replay recordings/ --export state.json
//! ```
//!
//! ### As a library with a replay source
//!
//! ```
//! use vitalwatch::{App, FileSource, MonitorSettings};
//!
//! let source = Box::new(FileSource::new("recordings/patient-032"));
//! let app = App::new(source, MonitorSettings::default()).unwrap();
//! assert!(app.state().snapshot.is_empty());
//! ```
//!
//! ### Running single cycles against STH-Comet
//!
//! ```no_run
//! use vitalwatch::{App, MonitorSettings, SthSource};
//! use vitalwatch_adapters::SthAdapter;
//!
//! # tokio_test::block_on(async {
//! let adapter = SthAdapter::builder()
//!     .endpoint("http://localhost:8666")
//!     .entity("Sensor", "urn:ngsi-ld:bpm:032")
//!     .build()
//!     .unwrap();
//! let mut app = App::new(Box::new(SthSource::new(adapter)), MonitorSettings::default()).unwrap();
//!
//! let mut updates = app.subscribe();
//! app.run_cycle().await;
//! for alert in updates.borrow_and_update().active_alerts() {
//!     println!("{}: {}", alert.attribute, alert.message);
//! }
//! # });
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod source;

// Re-export main types for convenience
pub use app::{App, CycleOutcome, CycleState, DataStatus, MonitorSettings, MonitorState, SkipReason};
pub use config::Settings;
pub use data::{
    AlertState, Alignment, Attribute, SeriesSummary, Severity, SignalWindow, WindowError,
    WindowSnapshot,
};
pub use source::{FetchOutcome, FileSource, SampleSource, SthSource, Unavailable};
