//! Vital-sign attributes and their samples.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use vitalwatch_adapters::RawSample;

use super::timestamp::{normalize, TimestampError};
use super::window::WindowError;

/// A vital-sign channel published by the monitored entity.
///
/// The serialized names match the attribute names used by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    #[serde(rename = "bpm")]
    Bpm,
    #[serde(rename = "temperatureC")]
    TemperatureC,
    #[serde(rename = "spo2")]
    Spo2,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Bpm, Attribute::TemperatureC, Attribute::Spo2];

    /// Attribute name as stored in the historical service.
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Bpm => "bpm",
            Attribute::TemperatureC => "temperatureC",
            Attribute::Spo2 => "spo2",
        }
    }

    /// Human-readable label for titles.
    pub fn label(&self) -> &'static str {
        match self {
            Attribute::Bpm => "BPM",
            Attribute::TemperatureC => "Temperature",
            Attribute::Spo2 => "SpO2",
        }
    }

    /// Unit the values are expressed in.
    pub fn unit(&self) -> &'static str {
        match self {
            Attribute::Bpm => "BPM",
            Attribute::TemperatureC => "°C",
            Attribute::Spo2 => "%",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bpm" => Ok(Attribute::Bpm),
            "temperaturec" | "temperature" | "temp" => Ok(Attribute::TemperatureC),
            "spo2" => Ok(Attribute::Spo2),
            other => Err(format!(
                "unknown attribute '{}' (expected bpm, temperatureC or spo2)",
                other
            )),
        }
    }
}

/// One normalized reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Tz>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Tz>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Normalize a raw sample into the given zone.
    pub fn from_raw(raw: &RawSample, zone: Tz) -> Result<Self, SampleError> {
        let timestamp = normalize(&raw.recv_time, zone)?;
        let value = raw
            .attr_value
            .trim()
            .parse::<f64>()
            .map_err(|_| SampleError::Value(raw.attr_value.clone()))?;
        Ok(Self { timestamp, value })
    }
}

/// Why a raw sample could not be turned into a [`Sample`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error("attribute value '{0}' is not a number")]
    Value(String),
}

/// The samples of one attribute from a single fetch, in source order.
///
/// The service is trusted to return chronological order; samples are never
/// re-sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    pub attribute: Attribute,
    pub samples: Vec<Sample>,
}

impl SignalSeries {
    pub fn new(attribute: Attribute, samples: Vec<Sample>) -> Self {
        Self { attribute, samples }
    }

    /// Normalize every raw sample. The first failure rejects the whole series.
    pub fn from_raw(attribute: Attribute, raw: &[RawSample], zone: Tz) -> Result<Self, WindowError> {
        let samples = raw
            .iter()
            .map(|r| Sample::from_raw(r, zone))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| WindowError::Sample { attribute, source })?;
        Ok(Self { attribute, samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep only the newest `last_n` samples.
    pub fn truncate_to_newest(&mut self, last_n: usize) {
        if self.samples.len() > last_n {
            let excess = self.samples.len() - last_n;
            self.samples.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Sao_Paulo;

    #[test]
    fn test_attribute_names_round_trip() {
        for attribute in Attribute::ALL {
            assert_eq!(attribute.name().parse::<Attribute>().unwrap(), attribute);
        }
        assert_eq!("Temperature".parse::<Attribute>().unwrap(), Attribute::TemperatureC);
        assert!("glucose".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_attribute_serde_names() {
        let json = serde_json::to_string(&Attribute::TemperatureC).unwrap();
        assert_eq!(json, "\"temperatureC\"");
        let parsed: Attribute = serde_json::from_str("\"spo2\"").unwrap();
        assert_eq!(parsed, Attribute::Spo2);
    }

    #[test]
    fn test_units() {
        assert_eq!(Attribute::Bpm.unit(), "BPM");
        assert_eq!(Attribute::TemperatureC.unit(), "°C");
        assert_eq!(Attribute::Spo2.unit(), "%");
    }

    #[test]
    fn test_sample_from_raw() {
        let raw = RawSample::new("2024-06-01T15:00:00.250Z", " 36.6 ");
        let sample = Sample::from_raw(&raw, Sao_Paulo).unwrap();
        assert_eq!(sample.value, 36.6);
        assert_eq!(sample.timestamp.to_rfc3339(), "2024-06-01T12:00:00.250-03:00");
    }

    #[test]
    fn test_sample_rejects_non_numeric_value() {
        let raw = RawSample::new("2024-06-01T15:00:00Z", "n/a");
        assert_eq!(
            Sample::from_raw(&raw, Sao_Paulo),
            Err(SampleError::Value("n/a".to_string()))
        );
    }

    #[test]
    fn test_series_from_raw_rejects_bad_timestamp() {
        let raw = vec![
            RawSample::new("2024-06-01T15:00:00Z", "70"),
            RawSample::new("yesterday", "71"),
        ];
        let err = SignalSeries::from_raw(Attribute::Bpm, &raw, Sao_Paulo).unwrap_err();
        assert!(matches!(
            err,
            WindowError::Sample {
                attribute: Attribute::Bpm,
                source: SampleError::Timestamp(_)
            }
        ));
    }

    #[test]
    fn test_truncate_keeps_newest() {
        let raw: Vec<RawSample> = (0..5)
            .map(|i| RawSample::new(format!("2024-06-01T15:00:0{}Z", i), format!("{}", 60 + i)))
            .collect();
        let mut series = SignalSeries::from_raw(Attribute::Bpm, &raw, Sao_Paulo).unwrap();
        series.truncate_to_newest(3);
        let values: Vec<f64> = series.samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![62.0, 63.0, 64.0]);

        series.truncate_to_newest(10);
        assert_eq!(series.len(), 3);
    }
}
