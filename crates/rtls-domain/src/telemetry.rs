use chrono::{DateTime, SecondsFormat, Utc};

/// Well-known names in the last-value table.
pub mod names {
    pub const ANCHOR: &str = "anchor";
    pub const IN_LINE: &str = "inLine";
    pub const IN_POSTE: &str = "inPoste";
    pub const IS_STRANGE: &str = "isStrange";

    pub const LAST_SEEN: &str = "lastSeen";
    pub const LAST_IN_POSTE: &str = "lastInPoste";
    pub const LAST_IS_STRANGE: &str = "lastIsStrange";
    pub const LAST_IN_LINE: &str = "lastInLine";
}

/// A last-known attribute value.
///
/// Timestamps are written by the engine itself, never copied from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryValue {
    Text(String),
    Flag(bool),
    Timestamp(DateTime<Utc>),
}

impl TelemetryValue {
    /// JSON representation stored in the last-value table. Timestamps
    /// serialize as ISO-8601 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TelemetryValue::Text(s) => serde_json::Value::String(s.clone()),
            TelemetryValue::Flag(b) => serde_json::Value::Bool(*b),
            TelemetryValue::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

/// One pending upsert against the (device, name) last-value table.
///
/// Applying a write replaces the whole stored value; there is no field-level
/// merge inside a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryWrite {
    pub name: &'static str,
    pub value: TelemetryValue,
}

impl TelemetryWrite {
    pub fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: TelemetryValue::Text(value.into()),
        }
    }

    pub fn flag(name: &'static str, value: bool) -> Self {
        Self {
            name,
            value: TelemetryValue::Flag(value),
        }
    }

    pub fn timestamp(name: &'static str, at: DateTime<Utc>) -> Self {
        Self {
            name,
            value: TelemetryValue::Timestamp(at),
        }
    }
}
