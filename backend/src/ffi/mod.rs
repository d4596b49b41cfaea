//! Python bindings (enabled with the `pyo3` feature)
//!
//! Configs, summaries and events cross the boundary as JSON strings.

pub mod engine;
