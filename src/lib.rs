/// floodcast: serial sensor → water level model → Firebase flood predictor.
///
/// # Module structure
///
/// ```text
/// floodcast
/// ├── model    — shared data types (SensorFrame, FeatureVector, SyncRecord, FloodError)
/// ├── config   — service configuration loader (floodcast.toml + environment)
/// ├── logging  — component-tagged console/file logging
/// ├── serial   — serial link reader and frame parser
/// ├── oracle   — pre-trained regression model (Predictor trait + JSON artifact)
/// ├── sync     — Firebase Realtime Database client
/// ├── poll     — poll loop (read → predict → sync) and interrupt handling
/// └── web      — form-based HTTP front door
/// ```

/// Public modules
pub mod config;
pub mod logging;
pub mod model;
pub mod oracle;
pub mod poll;
pub mod serial;
pub mod sync;
pub mod web;
