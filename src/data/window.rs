//! Rolling, cross-signal window of recent samples.
//!
//! Every successful cycle replaces the whole window. Attributes are staged one
//! at a time with [`SignalWindow::replace`] and only become visible together
//! through [`SignalWindow::commit`], which builds a new [`WindowSnapshot`].
//!
//! ## Time axis
//!
//! The snapshot has a single time axis taken from the reference attribute
//! (BPM by default). Each other attribute carries its own timestamps from its
//! own fetch, and commit checks them against the reference:
//!
//! - a series whose length differs from the reference rejects the cycle
//! - if a skew tolerance is set, any pair of samples at the same index whose
//!   timestamps differ by more than the tolerance rejects the cycle
//!
//! Without these checks a secondary fetch that raced a new reading would pair
//! values with the wrong instants.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use serde::Serialize;

use super::signal::{Attribute, SampleError, SignalSeries};

/// Default tolerance between paired timestamps of different attributes.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(1);

/// How secondary attributes are reconciled with the reference time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// `None` only checks sample counts.
    pub max_skew: Option<Duration>,
}

impl Default for Alignment {
    fn default() -> Self {
        Self {
            max_skew: Some(DEFAULT_MAX_SKEW),
        }
    }
}

/// Reasons a cycle's series could not become a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("{attribute}: {source}")]
    Sample {
        attribute: Attribute,
        source: SampleError,
    },

    #[error("attribute {0} is not tracked by this window")]
    Untracked(Attribute),

    #[error("no samples staged for {0}")]
    Incomplete(Attribute),

    #[error("{0} returned no samples")]
    Empty(Attribute),

    #[error("{attribute} has {found} samples but the reference has {expected}")]
    LengthMismatch {
        attribute: Attribute,
        expected: usize,
        found: usize,
    },

    #[error("{attribute} sample {index} is {skew:?} away from the reference timestamp")]
    Skew {
        attribute: Attribute,
        index: usize,
        skew: Duration,
    },
}

/// Per-signal figures shown next to a chart: latest reading and mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub attribute: Attribute,
    pub label: &'static str,
    pub unit: &'static str,
    pub latest: f64,
    pub mean: f64,
    pub samples: usize,
}

/// Aligned view of the window.
///
/// `series[a][i]` was sampled at `timestamps[i]` for every attribute `a`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub timestamps: Vec<DateTime<Tz>>,
    pub series: BTreeMap<Attribute, Vec<f64>>,
}

impl WindowSnapshot {
    /// True until the first successful cycle.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Values for an attribute, oldest first. Empty if untracked.
    pub fn values(&self, attribute: Attribute) -> &[f64] {
        self.series.get(&attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, attribute: Attribute) -> Option<f64> {
        self.values(attribute).last().copied()
    }

    /// Arithmetic mean of the window.
    pub fn mean(&self, attribute: Attribute) -> Option<f64> {
        let values = self.values(attribute);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn summary(&self, attribute: Attribute) -> Option<SeriesSummary> {
        Some(SeriesSummary {
            attribute,
            label: attribute.label(),
            unit: attribute.unit(),
            latest: self.latest(attribute)?,
            mean: self.mean(attribute)?,
            samples: self.values(attribute).len(),
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.series.keys().copied()
    }
}

/// The window state owned by the poll loop.
#[derive(Debug)]
pub struct SignalWindow {
    tracked: Vec<Attribute>,
    reference: Attribute,
    last_n: usize,
    alignment: Alignment,
    current: Arc<WindowSnapshot>,
    staged: BTreeMap<Attribute, SignalSeries>,
}

impl SignalWindow {
    /// Create an empty window.
    ///
    /// `reference` supplies the time axis and must be one of `tracked`.
    pub fn new(
        tracked: Vec<Attribute>,
        reference: Attribute,
        last_n: usize,
        alignment: Alignment,
    ) -> Result<Self, WindowError> {
        if !tracked.contains(&reference) {
            return Err(WindowError::Untracked(reference));
        }

        let empty = WindowSnapshot {
            timestamps: Vec::new(),
            series: tracked.iter().map(|a| (*a, Vec::new())).collect(),
        };

        Ok(Self {
            tracked,
            reference,
            last_n: last_n.max(1),
            alignment,
            current: Arc::new(empty),
            staged: BTreeMap::new(),
        })
    }

    pub fn tracked(&self) -> &[Attribute] {
        &self.tracked
    }

    pub fn reference(&self) -> Attribute {
        self.reference
    }

    pub fn last_n(&self) -> usize {
        self.last_n
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> Arc<WindowSnapshot> {
        Arc::clone(&self.current)
    }

    /// Stage the series for one attribute, keeping the newest `last_n` samples.
    pub fn replace(&mut self, mut series: SignalSeries) -> Result<(), WindowError> {
        if !self.tracked.contains(&series.attribute) {
            return Err(WindowError::Untracked(series.attribute));
        }
        series.truncate_to_newest(self.last_n);
        self.staged.insert(series.attribute, series);
        Ok(())
    }

    /// Drop anything staged in the current cycle.
    pub fn discard(&mut self) {
        self.staged.clear();
    }

    /// Publish the staged series as a new snapshot.
    ///
    /// Staged series are consumed either way; on error the previous snapshot
    /// stays current.
    pub fn commit(&mut self) -> Result<Arc<WindowSnapshot>, WindowError> {
        let mut staged = std::mem::take(&mut self.staged);

        for attribute in &self.tracked {
            match staged.get(attribute) {
                None => return Err(WindowError::Incomplete(*attribute)),
                Some(series) if series.is_empty() => return Err(WindowError::Empty(*attribute)),
                Some(_) => {}
            }
        }

        let reference = staged
            .remove(&self.reference)
            .ok_or(WindowError::Incomplete(self.reference))?;

        for series in staged.values() {
            self.check_alignment(&reference, series)?;
        }

        let mut values = BTreeMap::new();
        values.insert(
            reference.attribute,
            reference.samples.iter().map(|s| s.value).collect(),
        );
        for (attribute, series) in staged {
            values.insert(attribute, series.samples.iter().map(|s| s.value).collect());
        }

        let snapshot = Arc::new(WindowSnapshot {
            timestamps: reference.samples.iter().map(|s| s.timestamp).collect(),
            series: values,
        });
        self.current = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    fn check_alignment(
        &self,
        reference: &SignalSeries,
        series: &SignalSeries,
    ) -> Result<(), WindowError> {
        if series.len() != reference.len() {
            return Err(WindowError::LengthMismatch {
                attribute: series.attribute,
                expected: reference.len(),
                found: series.len(),
            });
        }

        let Some(max_skew) = self.alignment.max_skew else {
            return Ok(());
        };
        // A tolerance beyond chrono's range admits every pair.
        let Ok(tolerance) = TimeDelta::from_std(max_skew) else {
            return Ok(());
        };

        for (index, (r, s)) in reference.samples.iter().zip(&series.samples).enumerate() {
            let skew = (r.timestamp - s.timestamp).abs();
            if skew > tolerance {
                return Err(WindowError::Skew {
                    attribute: series.attribute,
                    index,
                    skew: skew.to_std().unwrap_or_default(),
                });
            }
        }

        Ok(())
    }
}
