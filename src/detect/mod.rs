//! Insight generation: pattern detectors, scoring helpers, and the scan
//! engine that orchestrates them.

pub mod detectors;
pub mod engine;
pub mod scoring;

pub use engine::{default_engine, generate_for_scope, DetectorContext, EngineError, InsightEngine};
