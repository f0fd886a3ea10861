//! Sensor readings and the metadata attached to surviving detections.

use crate::cell::Cell;
use serde::{Deserialize, Serialize};

/// Metadata recorded for one detection dot.
///
/// Not part of CRDT convergence: the side table is keyed by the dot that
/// survived the add-wins join, and a dot's metadata never changes once
/// written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FireMeta {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub confidence: f64,
    pub temperature: f64,
}

impl FireMeta {
    pub fn new(timestamp_ms: i64, confidence: f64, temperature: f64) -> Self {
        Self {
            timestamp_ms,
            confidence,
            temperature,
        }
    }
}

/// One raw sample from the onboard fire sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub cell: Cell,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub confidence: f64,
    pub temperature: f64,
}

impl SensorReading {
    pub fn new(cell: Cell, timestamp_ms: i64, confidence: f64, temperature: f64) -> Self {
        Self {
            cell,
            timestamp_ms,
            confidence,
            temperature,
        }
    }

    /// The metadata this reading would attach to a detection dot.
    pub fn meta(&self) -> FireMeta {
        FireMeta::new(self.timestamp_ms, self.confidence, self.temperature)
    }
}
