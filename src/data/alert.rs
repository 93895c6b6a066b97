//! Clinical threshold alerts.
//!
//! Alerts are a pure function of the latest reading of each signal. Nothing is
//! remembered between cycles.

use serde::Serialize;

use super::signal::Attribute;
use super::window::WindowSnapshot;

/// Shown when the sensor reads exactly zero, i.e. nothing is being measured.
pub const NO_CONTACT_MESSAGE: &str = "place finger";

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    None,
    Warning,
}

impl Severity {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::None => "OK",
            Severity::Warning => "WARN",
        }
    }
}

/// Alert for one attribute. An empty message means no alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub attribute: Attribute,
    pub message: String,
    pub severity: Severity,
}

impl AlertState {
    pub fn clear(attribute: Attribute) -> Self {
        Self {
            attribute,
            message: String::new(),
            severity: Severity::None,
        }
    }

    fn warning(attribute: Attribute, message: &str) -> Self {
        Self {
            attribute,
            message: message.to_string(),
            severity: Severity::Warning,
        }
    }

    pub fn is_active(&self) -> bool {
        self.severity != Severity::None
    }
}

/// Normal range for a signal and the messages for leaving it.
///
/// Bounds are inclusive: `low` and `high` themselves are normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRule {
    pub low: f64,
    pub high: f64,
    pub low_message: &'static str,
    pub high_message: &'static str,
}

pub const BPM_RULE: AlertRule = AlertRule {
    low: 60.0,
    high: 100.0,
    low_message: "BPM low",
    high_message: "BPM high",
};

pub const TEMPERATURE_RULE: AlertRule = AlertRule {
    low: 35.0,
    high: 38.0,
    low_message: "temperature low",
    high_message: "temperature high",
};

/// The rule for an attribute. SpO2 has none.
pub fn rule_for(attribute: Attribute) -> Option<&'static AlertRule> {
    match attribute {
        Attribute::Bpm => Some(&BPM_RULE),
        Attribute::TemperatureC => Some(&TEMPERATURE_RULE),
        // TODO: confirm with the clinical team whether SpO2 needs a low-saturation rule.
        Attribute::Spo2 => None,
    }
}

/// Evaluate the latest value of one attribute.
///
/// Zero is checked before the low bound since it also lies below it. NaN
/// compares false everywhere and so raises nothing.
pub fn evaluate(attribute: Attribute, latest: f64) -> AlertState {
    let Some(rule) = rule_for(attribute) else {
        return AlertState::clear(attribute);
    };

    if latest == 0.0 {
        AlertState::warning(attribute, NO_CONTACT_MESSAGE)
    } else if latest < rule.low {
        AlertState::warning(attribute, rule.low_message)
    } else if latest > rule.high {
        AlertState::warning(attribute, rule.high_message)
    } else {
        AlertState::clear(attribute)
    }
}

/// One alert per attribute in the snapshot, in attribute order.
pub fn evaluate_snapshot(snapshot: &WindowSnapshot) -> Vec<AlertState> {
    snapshot
        .attributes()
        .map(|attribute| match snapshot.latest(attribute) {
            Some(latest) => evaluate(attribute, latest),
            None => AlertState::clear(attribute),
        })
        .collect()
}
