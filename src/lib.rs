//! feedback-pulse: multi-tenant feedback analytics.
//!
//! Takes processed customer feedback (sentiment, topics, urgency already
//! attached), runs a registry of pattern detectors over a time window, and
//! persists deduplicated, severity-ranked insights to SQLite.
//!
//! The flow is `db::FeedbackDb` (storage) -> `detect::engine` (one snapshot,
//! six detectors) -> insight upserts keyed on (scope, type, title) within a
//! 24-hour horizon, so repeated scans refresh rows instead of duplicating
//! them.

pub mod db;
pub mod detect;
pub mod migrations;
pub mod types;

pub use db::{DbError, FeedbackDb, InsightFilter, UpsertOutcome};
pub use detect::{default_engine, generate_for_scope, DetectorContext, EngineError, InsightEngine};
pub use types::{
    FeedbackRecord, Insight, InsightDraft, InsightType, SampleFeedback, ScanSummary, Sentiment,
    Severity, Urgency,
};
