use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Default zone readings are presented in.
pub const DEFAULT_ZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Tried in order: fractional seconds first, then whole seconds.
const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized timestamp '{0}'")]
pub struct TimestampError(pub String);

/// Convert a UTC reception time like `2024-05-01T12:00:00.123Z` into `zone`.
///
/// Uses the tz database, so historical DST rules for the date are honored.
pub fn normalize(raw: &str, zone: Tz) -> Result<DateTime<Tz>, TimestampError> {
    let literal = raw.trim().replace('T', " ").replace('Z', "");

    let naive = FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&literal, format).ok())
        .ok_or_else(|| TimestampError(raw.to_string()))?;

    Ok(Utc.from_utc_datetime(&naive).with_timezone(&zone))
}

/// Parse an IANA zone identifier such as `America/Sao_Paulo`.
pub fn parse_zone(name: &str) -> Result<Tz, String> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| format!("unknown timezone '{}': {}", name, e))
}
