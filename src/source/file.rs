//! File-based data source.
//!
//! Replays STH-Comet responses recorded on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vitalwatch_adapters::sth::parse_history;

use super::{FetchOutcome, SampleSource, Unavailable};
use crate::data::Attribute;

/// A data source that reads recorded history responses from a directory.
///
/// Each attribute is read from `<dir>/<attribute>.json` (e.g. `bpm.json`,
/// `temperatureC.json`) holding a body exactly as STH-Comet returns it. The
/// file is re-read on every fetch, so rewriting it changes what the next
/// cycle sees.
#[derive(Debug)]
pub struct FileSource {
    dir: PathBuf,
    description: String,
}

impl FileSource {
    /// Create a new file source for the given directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let description = format!("replay: {}", dir.display());
        Self { dir, description }
    }

    /// Returns the directory being replayed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the recording for an attribute.
    pub fn path_for(&self, attribute: Attribute) -> PathBuf {
        self.dir.join(format!("{}.json", attribute.name()))
    }
}

#[async_trait]
impl SampleSource for FileSource {
    async fn fetch(&self, attribute: Attribute, last_n: usize) -> FetchOutcome {
        let path = self.path_for(attribute);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return FetchOutcome::Unavailable(Unavailable::Transport(format!(
                    "read error on {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        // The service only ever returns the newest `last_n`; mimic that.
        let result = parse_history(&content).map(|mut samples| {
            let excess = samples.len().saturating_sub(last_n);
            samples.drain(..excess);
            samples
        });

        FetchOutcome::from_result(result)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use vitalwatch_adapters::RawSample;

    fn write_history(dir: &Path, attribute: &str, values: &[&str]) {
        let values: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                format!(
                    r#"{{"recvTime":"2024-06-01T15:00:{:02}.000Z","attrValue":"{}"}}"#,
                    i * 2,
                    v
                )
            })
            .collect();
        let body = format!(
            r#"{{"contextResponses":[{{"contextElement":{{"attributes":[{{"name":"{}","values":[{}]}}]}}}}]}}"#,
            attribute,
            values.join(",")
        );
        fs::write(dir.join(format!("{}.json", attribute)), body).unwrap();
    }

    #[test]
    fn test_file_source_new() {
        let source = FileSource::new("/tmp/recordings");
        assert_eq!(source.dir(), Path::new("/tmp/recordings"));
        assert_eq!(source.description(), "replay: /tmp/recordings");
        assert_eq!(
            source.path_for(Attribute::TemperatureC),
            Path::new("/tmp/recordings/temperatureC.json")
        );
    }

    #[tokio::test]
    async fn test_file_source_reads_recording() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path(), "bpm", &["70", "72", "75"]);

        let source = FileSource::new(dir.path());
        let outcome = source.fetch(Attribute::Bpm, 30).await;
        match outcome {
            FetchOutcome::Samples(samples) => {
                assert_eq!(samples.len(), 3);
                assert_eq!(samples[2], RawSample::new("2024-06-01T15:00:04.000Z", "75"));
            }
            other => panic!("expected samples, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_source_keeps_newest() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path(), "spo2", &["95", "96", "97", "98"]);

        let source = FileSource::new(dir.path());
        let FetchOutcome::Samples(samples) = source.fetch(Attribute::Spo2, 2).await else {
            panic!("expected samples");
        };
        let values: Vec<&str> = samples.iter().map(|s| s.attr_value.as_str()).collect();
        assert_eq!(values, vec!["97", "98"]);
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(dir.path());

        let outcome = source.fetch(Attribute::Bpm, 30).await;
        match outcome {
            FetchOutcome::Unavailable(Unavailable::Transport(msg)) => {
                assert!(msg.contains("read error"))
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_source_invalid_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bpm.json"), "not valid json").unwrap();

        let source = FileSource::new(dir.path());
        assert!(matches!(
            source.fetch(Attribute::Bpm, 30).await,
            FetchOutcome::Unavailable(Unavailable::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_empty_history() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path(), "temperatureC", &[]);

        let source = FileSource::new(dir.path());
        assert_eq!(
            source.fetch(Attribute::TemperatureC, 30).await,
            FetchOutcome::Unavailable(Unavailable::Empty)
        );
    }
}
