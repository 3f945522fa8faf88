/// Core data types for the flood prediction service.
///
/// This module defines the shared domain model imported by all other modules:
/// the per-iteration values that flow through the poll loop and the error
/// taxonomy every component reports through. It contains no I/O.

use chrono::{Datelike, NaiveDate};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

use crate::config::SiteConfig;

// ---------------------------------------------------------------------------
// Sensor frames
// ---------------------------------------------------------------------------

/// One parsed serial frame: sensor id → reading.
///
/// Produced fresh on every serial read and discarded at the end of the
/// poll iteration that read it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorFrame {
    readings: HashMap<u32, f64>,
}

impl SensorFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reading. A later reading for the same id replaces the earlier one.
    pub fn insert(&mut self, sensor_id: u32, value: f64) {
        self.readings.insert(sensor_id, value);
    }

    pub fn get(&self, sensor_id: u32) -> Option<f64> {
        self.readings.get(&sensor_id).copied()
    }

    /// Reading for `sensor_id`, or `0.0` when the frame did not carry it.
    pub fn reading_or_zero(&self, sensor_id: u32) -> f64 {
        self.get(sensor_id).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings sorted by sensor id, for stable log output.
    pub fn sorted(&self) -> Vec<(u32, f64)> {
        let mut pairs: Vec<(u32, f64)> = self.readings.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs
    }
}

impl std::fmt::Display for SensorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .sorted()
            .iter()
            .map(|(id, value)| format!("{}: {}", id, value))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl FromIterator<(u32, f64)> for SensorFrame {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Self {
            readings: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Model inputs and outputs
// ---------------------------------------------------------------------------

/// Model input for one monitoring site: (day, month, year, flow, rainfall).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub day: f64,
    pub month: f64,
    pub year: f64,
    pub flow: f64,
    pub rainfall: f64,
}

impl FeatureVector {
    pub fn new(date: NaiveDate, flow: f64, rainfall: f64) -> Self {
        Self {
            day: date.day() as f64,
            month: date.month() as f64,
            year: date.year() as f64,
            flow,
            rainfall,
        }
    }

    /// Builds the vector for `site` from the current frame.
    pub fn for_site(date: NaiveDate, frame: &SensorFrame, site: &SiteConfig) -> Self {
        Self::new(date, frame.reading_or_zero(site.sensor_id), site.rainfall)
    }

    /// Column order the model was trained with.
    pub fn to_array(&self) -> [f64; 5] {
        [self.day, self.month, self.year, self.flow, self.rainfall]
    }
}

/// Predicted water levels, one per configured site, in site order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub levels: Vec<f64>,
}

impl Predictions {
    pub fn new(levels: Vec<f64>) -> Self {
        Self { levels }
    }

    pub fn level(&self, index: usize) -> Option<f64> {
        self.levels.get(index).copied()
    }
}

// ---------------------------------------------------------------------------
// Remote sync record
// ---------------------------------------------------------------------------

/// Values written for one site within a [`SyncRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteSample {
    pub flow: f64,
    pub rainfall: f64,
    pub level: f64,
}

/// The record mirrored to the realtime database on every poll iteration.
///
/// Serializes flat: `date`, `month`, `year`, then `flow<n>`, `rainflow<n>`
/// and `level<n>` for each site `n` starting at 1. Two sites give the nine
/// fields the dashboard reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    /// Day of month, zero-padded ("07").
    pub date: String,
    /// Month, zero-padded ("03").
    pub month: String,
    /// Four-digit year.
    pub year: String,
    pub sites: Vec<SiteSample>,
}

impl SyncRecord {
    /// Assembles the record for one iteration. A site whose sensor is missing
    /// from the frame reports a flow of `0.0`; a site without a prediction
    /// reports a level of `0.0`.
    pub fn build(
        date: NaiveDate,
        sites: &[SiteConfig],
        frame: &SensorFrame,
        predictions: &Predictions,
    ) -> Self {
        let samples = sites
            .iter()
            .enumerate()
            .map(|(i, site)| SiteSample {
                flow: frame.reading_or_zero(site.sensor_id),
                rainfall: site.rainfall,
                level: predictions.level(i).unwrap_or(0.0),
            })
            .collect();

        SyncRecord {
            date: date.format("%d").to_string(),
            month: date.format("%m").to_string(),
            year: date.format("%Y").to_string(),
            sites: samples,
        }
    }

    /// Number of top-level fields this record writes.
    pub fn field_count(&self) -> usize {
        3 + self.sites.len() * 3
    }
}

impl Serialize for SyncRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.field_count()))?;
        map.serialize_entry("date", &self.date)?;
        map.serialize_entry("month", &self.month)?;
        map.serialize_entry("year", &self.year)?;
        for (i, site) in self.sites.iter().enumerate() {
            map.serialize_entry(&format!("flow{}", i + 1), &site.flow)?;
        }
        for (i, site) in self.sites.iter().enumerate() {
            map.serialize_entry(&format!("rainflow{}", i + 1), &site.rainfall)?;
        }
        for (i, site) in self.sites.iter().enumerate() {
            map.serialize_entry(&format!("level{}", i + 1), &site.level)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise anywhere in the service.
#[derive(Debug, PartialEq)]
pub enum FloodError {
    /// The serial channel could not be opened, or failed mid-read.
    Connection(String),
    /// Input text (a form field or a document) could not be parsed.
    Parse(String),
    /// The model artifact could not be loaded, or rejected its input.
    Model(String),
    /// Authenticating to or writing the remote store failed.
    Sync(String),
    /// Configuration is missing or invalid.
    Config(String),
}

impl FloodError {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            FloodError::Connection(_) => "connection",
            FloodError::Parse(_) => "parse",
            FloodError::Model(_) => "model",
            FloodError::Sync(_) => "sync",
            FloodError::Config(_) => "config",
        }
    }
}

impl std::fmt::Display for FloodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloodError::Connection(msg) => write!(f, "Connection error: {}", msg),
            FloodError::Parse(msg) => write!(f, "Parse error: {}", msg),
            FloodError::Model(msg) => write!(f, "Model error: {}", msg),
            FloodError::Sync(msg) => write!(f, "Sync error: {}", msg),
            FloodError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FloodError {}
