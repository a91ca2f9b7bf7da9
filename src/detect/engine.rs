//! Scan orchestration: runs the detector registry over one feedback
//! snapshot and persists the resulting drafts.
//!
//! A scan is one scope (a tenant, or `None` for the whole database), one
//! lookback window, one snapshot fetch, six detectors, one summary. A
//! detector producing nothing is normal; a draft that fails to persist is
//! logged and skipped so one bad row never sinks the scan.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::detectors;
use crate::db::{DbError, FeedbackDb};
use crate::types::{FeedbackRecord, InsightDraft, ScanSummary};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown scope: {0}")]
    ScopeNotFound(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Snapshot-relative time context handed to every detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorContext {
    pub now: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub days_back: i64,
}

pub type DetectorFn = fn(&[FeedbackRecord], &DetectorContext) -> Vec<InsightDraft>;

struct DetectorEntry {
    name: &'static str,
    detector: DetectorFn,
}

/// Ordered detector registry. Registration order is emission order, which
/// keeps scan logs and summaries stable across runs.
pub struct InsightEngine {
    detectors: Vec<DetectorEntry>,
}

impl InsightEngine {
    pub fn new() -> Self {
        InsightEngine {
            detectors: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, detector: DetectorFn) {
        self.detectors.push(DetectorEntry { name, detector });
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|e| e.name).collect()
    }

    /// Run every registered detector over the snapshot, in order.
    pub fn synthesize(
        &self,
        db: &FeedbackDb,
        items: &[FeedbackRecord],
        ctx: &DetectorContext,
    ) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();
        for entry in &self.detectors {
            let produced = (entry.detector)(items, ctx);
            log::debug!("{}: {} insight(s)", entry.name, produced.len());
            // Bookkeeping only; a write failure here must not abort the scan
            if let Err(err) = db.record_scan_state(entry.name, produced.len()) {
                log::warn!("failed to record scan state for {}: {}", entry.name, err);
            }
            drafts.extend(produced);
        }
        drafts
    }

    /// Full scan for one scope: validate, fetch, detect, persist, summarize.
    pub fn run(
        &self,
        db: &FeedbackDb,
        scope: Option<&str>,
        days_back: i64,
    ) -> Result<ScanSummary, EngineError> {
        if let Some(tenant_id) = scope {
            if !db.tenant_exists(tenant_id)? {
                return Err(EngineError::ScopeNotFound(tenant_id.to_string()));
            }
        }

        let now = Utc::now();
        let ctx = DetectorContext {
            now,
            window_start: now - Duration::days(days_back),
            days_back,
        };

        let snapshot = db.fetch_window(scope, ctx.window_start)?;
        log::info!(
            "scanning scope={} over {} days ({} feedback items)",
            scope.unwrap_or("all"),
            days_back,
            snapshot.len()
        );

        let drafts = self.synthesize(db, &snapshot, &ctx);

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        for draft in &drafts {
            *by_type.entry(draft.kind.as_str().to_string()).or_default() += 1;
            *by_severity
                .entry(draft.severity.as_str().to_string())
                .or_default() += 1;
        }

        let mut total_saved = 0;
        for draft in &drafts {
            match db.upsert_insight(scope, draft) {
                Ok(_) => total_saved += 1,
                Err(err) => {
                    log::error!("failed to save insight '{}': {}", draft.title, err);
                }
            }
        }
        log::info!("saved {}/{} insights", total_saved, drafts.len());

        Ok(ScanSummary {
            total_generated: drafts.len(),
            total_saved,
            by_type,
            by_severity,
            scope: scope.map(str::to_string),
            days_analyzed: days_back,
        })
    }
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard registry: all six detectors in their canonical order.
pub fn default_engine() -> InsightEngine {
    let mut engine = InsightEngine::new();
    engine.register("recurring_complaints", detectors::detect_recurring_complaints);
    engine.register("recurring_praise", detectors::detect_recurring_praise);
    engine.register("critical_feedback", detectors::detect_critical_feedback);
    engine.register("product_insights", detectors::detect_product_insights);
    engine.register("sentiment_trend", detectors::detect_sentiment_trend);
    engine.register("urgent_issues", detectors::detect_urgent_issues);
    engine
}

/// Convenience entry point: one scan with the default registry.
pub fn generate_for_scope(
    db: &FeedbackDb,
    scope: Option<&str>,
    days_back: i64,
) -> Result<ScanSummary, EngineError> {
    default_engine().run(db, scope, days_back)
}
