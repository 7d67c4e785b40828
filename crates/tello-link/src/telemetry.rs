//! Telemetry parsing and buffering
//!
//! The device streams one datagram per update, e.g.
//!
//! ```text
//! mid:-1;x:0;y:0;z:0;pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:83;temph:85;tof:10;h:0;bat:87;baro:182.47;time:0;agx:-5.00;agy:1.00;agz:-999.00;
//! ```
//!
//! Each datagram rebuilds the snapshot from scratch. Readers load the latest
//! snapshot through [`ArcSwap`] without blocking the telemetry thread.

use crate::error::{LinkError, Result};
use arc_swap::ArcSwap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Field separator between `key:value` pairs.
pub const FIELD_SEPARATOR: char = ';';
/// Separator between key and value within a field.
pub const KEY_VALUE_SEPARATOR: char = ':';

macro_rules! telemetry_keys {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Closed set of telemetry keys the device reports
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum TelemetryKey {
            $($variant),+
        }

        impl TelemetryKey {
            /// All keys in canonical (wire) order.
            pub const ALL: &'static [TelemetryKey] = &[$(TelemetryKey::$variant),+];

            /// Wire name of the key.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(TelemetryKey::$variant => $name),+
                }
            }
        }

        impl FromStr for TelemetryKey {
            type Err = UnknownTelemetryKey;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok(TelemetryKey::$variant),)+
                    _ => Err(UnknownTelemetryKey(s.to_string())),
                }
            }
        }
    };
}

telemetry_keys! {
    MissionPadId => "mid",
    X => "x",
    Y => "y",
    Z => "z",
    Pitch => "pitch",
    Roll => "roll",
    Yaw => "yaw",
    VelocityX => "vgx",
    VelocityY => "vgy",
    VelocityZ => "vgz",
    TempLow => "templ",
    TempHigh => "temph",
    TimeOfFlight => "tof",
    Height => "h",
    Battery => "bat",
    MotorTime => "time",
    Barometer => "baro",
    AccelX => "agx",
    AccelY => "agy",
    AccelZ => "agz",
}

impl TelemetryKey {
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TelemetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A key outside the closed telemetry set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown telemetry key: {0}")]
pub struct UnknownTelemetryKey(pub String);

/// Latest value for each telemetry key
///
/// Values stay as the device sent them (text); use [`TelemetrySnapshot::parse`]
/// for numeric reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    values: [Option<String>; TelemetryKey::ALL.len()],
}

impl TelemetrySnapshot {
    /// Build a snapshot from raw `key:value` fields.
    ///
    /// For every known key the fields are scanned for a match; a key that
    /// appears more than once keeps the last occurrence. Unknown keys and
    /// fields without a `:` are ignored.
    pub fn from_fields<'a>(raw_fields: impl IntoIterator<Item = &'a str>) -> Self {
        let pairs: Vec<(&str, &str)> = raw_fields
            .into_iter()
            .filter_map(|field| field.trim().split_once(KEY_VALUE_SEPARATOR))
            .collect();

        let mut snapshot = Self::default();
        for &key in TelemetryKey::ALL {
            for (name, value) in &pairs {
                if *name == key.as_str() {
                    snapshot.values[key.index()] = Some((*value).to_string());
                }
            }
        }
        snapshot
    }

    pub fn get(&self, key: TelemetryKey) -> Option<&str> {
        self.values[key.index()].as_deref()
    }

    /// Parse a value, e.g. `snapshot.parse::<f32>(TelemetryKey::Barometer)`.
    ///
    /// `None` when the key is absent or the text does not parse.
    pub fn parse<T: FromStr>(&self, key: TelemetryKey) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Present keys and values in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (TelemetryKey, &str)> {
        TelemetryKey::ALL
            .iter()
            .filter_map(|&key| self.get(key).map(|value| (key, value)))
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split one telemetry datagram into raw fields.
///
/// # Errors
/// - [`LinkError::Decode`]: payload is not ASCII text
pub fn decode_datagram(bytes: &[u8]) -> Result<Vec<&str>> {
    if !bytes.is_ascii() {
        return Err(LinkError::Decode(format!(
            "non-ASCII telemetry payload ({} bytes)",
            bytes.len()
        )));
    }
    let text = std::str::from_utf8(bytes).map_err(|e| LinkError::Decode(e.to_string()))?;
    Ok(text.split(FIELD_SEPARATOR).collect())
}

/// Shared telemetry buffer
///
/// Written by the telemetry receiver once per datagram, read on demand by
/// any thread.
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    snapshot: ArcSwap<TelemetrySnapshot>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with one built from `raw_fields`.
    pub fn ingest<'a>(&self, raw_fields: impl IntoIterator<Item = &'a str>) {
        self.snapshot
            .store(Arc::new(TelemetrySnapshot::from_fields(raw_fields)));
    }

    /// Value for `key`; `None` for unknown keys and keys not yet observed.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let key = key.parse::<TelemetryKey>().ok()?;
        self.get(key)
    }

    pub fn get(&self, key: TelemetryKey) -> Option<String> {
        self.snapshot.load().get(key).map(str::to_string)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn clear(&self) {
        self.snapshot.store(Arc::new(TelemetrySnapshot::default()));
    }
}
