//! Sample source abstraction.
//!
//! A source answers one question: "what are the last N raw values of this
//! attribute?". It never fails loudly. Anything that goes wrong is reported as
//! [`FetchOutcome::Unavailable`] with a reason, and the poll cycle treats every
//! reason the same way: no update this cycle.

mod file;
mod sth;

pub use file::FileSource;
pub use sth::SthSource;

use std::fmt::{self, Debug};

use async_trait::async_trait;
use vitalwatch_adapters::{AdapterError, RawSample};

use crate::data::Attribute;

/// Why a fetch produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// Network or I/O failure.
    Transport(String),
    /// The service answered with a non-success status.
    Status(u16),
    /// The request or the cycle ran out of time.
    Timeout,
    /// The payload did not have the expected shape.
    Schema(String),
    /// The service had no values for the attribute.
    Empty,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::Transport(msg) => write!(f, "transport error: {}", msg),
            Unavailable::Status(code) => write!(f, "service returned status {}", code),
            Unavailable::Timeout => f.write_str("timed out"),
            Unavailable::Schema(msg) => write!(f, "unexpected payload: {}", msg),
            Unavailable::Empty => f.write_str("no samples"),
        }
    }
}

impl From<AdapterError> for Unavailable {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout => Unavailable::Timeout,
            AdapterError::Status(code) => Unavailable::Status(code),
            AdapterError::Parse(msg) => Unavailable::Schema(msg),
            AdapterError::Http(msg) | AdapterError::Connection(msg) => Unavailable::Transport(msg),
        }
    }
}

/// Result of fetching one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Samples(Vec<RawSample>),
    Unavailable(Unavailable),
}

impl FetchOutcome {
    /// Fold an adapter result into an outcome. An empty list is unavailable.
    pub fn from_result(result: Result<Vec<RawSample>, AdapterError>) -> Self {
        match result {
            Ok(samples) if samples.is_empty() => FetchOutcome::Unavailable(Unavailable::Empty),
            Ok(samples) => FetchOutcome::Samples(samples),
            Err(err) => FetchOutcome::Unavailable(err.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, FetchOutcome::Samples(_))
    }
}

/// Trait for fetching raw attribute history from various backends.
///
/// Implementations provide samples from the STH-Comet service or from
/// recorded files.
///
/// # Example
///
/// ```no_run
/// use vitalwatch::{Attribute, FetchOutcome, FileSource, SampleSource};
///
/// # tokio_test::block_on(async {
/// let source = FileSource::new("recordings/patient-032");
/// match source.fetch(Attribute::Bpm, 30).await {
///     FetchOutcome::Samples(samples) => println!("{} samples", samples.len()),
///     FetchOutcome::Unavailable(reason) => println!("unavailable: {}", reason),
/// }
/// # });
/// ```
#[async_trait]
pub trait SampleSource: Send + Sync + Debug {
    /// Fetch the `last_n` most recent raw samples of `attribute`, oldest first.
    async fn fetch(&self, attribute: Attribute, last_n: usize) -> FetchOutcome;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_unavailable() {
        assert_eq!(
            FetchOutcome::from_result(Ok(Vec::new())),
            FetchOutcome::Unavailable(Unavailable::Empty)
        );
    }

    #[test]
    fn test_samples_pass_through() {
        let samples = vec![RawSample::new("2024-06-01T15:00:00Z", "72")];
        let outcome = FetchOutcome::from_result(Ok(samples.clone()));
        assert!(outcome.is_available());
        assert_eq!(outcome, FetchOutcome::Samples(samples));
    }

    #[test]
    fn test_adapter_errors_map_to_reasons() {
        assert_eq!(Unavailable::from(AdapterError::Timeout), Unavailable::Timeout);
        assert_eq!(Unavailable::from(AdapterError::Status(500)), Unavailable::Status(500));
        assert_eq!(
            Unavailable::from(AdapterError::Parse("bad".to_string())),
            Unavailable::Schema("bad".to_string())
        );
        assert_eq!(
            Unavailable::from(AdapterError::Connection("refused".to_string())),
            Unavailable::Transport("refused".to_string())
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Unavailable::Status(503).to_string(), "service returned status 503");
        assert_eq!(Unavailable::Empty.to_string(), "no samples");
    }
}
