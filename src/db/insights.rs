//! Insight persistence: the 24-hour dedup upsert, the read/filter surface,
//! resolution, and the retention sweep.
//!
//! The dedup key is (tenant, type, title). It is a deliberate heuristic: a
//! draft whose title drifts (topic casing, rephrasing) will miss the match
//! and create a second row. Matching stays exact for behavioral parity with
//! the dashboards that depend on stable titles.

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_ts, ts, DbError, FeedbackDb};
use crate::types::{Insight, InsightDraft, InsightType, Severity};

/// What `upsert_insight` did with the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(String),
    Updated(String),
}

impl UpsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Filter for `list_insights`. `scope` distinguishes "any tenant" (`None`)
/// from "global insights only" (`Some(None)`) and "one tenant"
/// (`Some(Some(id))`).
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub scope: Option<Option<String>>,
    pub kind: Option<InsightType>,
    pub severity: Option<Severity>,
    pub is_active: Option<bool>,
    pub is_resolved: Option<bool>,
    pub limit: Option<usize>,
}

const INSIGHT_COLUMNS: &str = "id, tenant_id, type, severity, title, description, recommendation,
     metrics, related_topics, product_name, sample_feedbacks,
     is_active, is_resolved, resolved_at, resolved_notes, created_at, updated_at";

impl FeedbackDb {
    // =========================================================================
    // Upsert (dedup policy)
    // =========================================================================

    /// Persist one insight draft for a scope.
    ///
    /// If an insight with the same (tenant, type, title) was created within
    /// the last 24 hours, every mutable field is overwritten in place and
    /// `updated_at` bumped; resolution fields are never touched. Otherwise a
    /// new active, unresolved row is created.
    ///
    /// Runs as a single `BEGIN IMMEDIATE` transaction so two overlapping
    /// scans converge on one row per dedup key instead of racing a duplicate.
    pub fn upsert_insight(
        &self,
        scope: Option<&str>,
        draft: &InsightDraft,
    ) -> Result<UpsertOutcome, DbError> {
        let metrics_json = serde_json::to_string(&draft.metrics)?;
        let topics_json = serde_json::to_string(&draft.related_topics)?;
        let samples_json = serde_json::to_string(&draft.sample_feedbacks)?;

        self.with_transaction(|db| {
            let now = ts(Utc::now());
            let day_ago = ts(Utc::now() - Duration::days(1));

            let existing: Option<String> = db
                .conn
                .query_row(
                    "SELECT id FROM insights
                     WHERE tenant_id IS ?1 AND type = ?2 AND title = ?3
                       AND created_at >= ?4
                     ORDER BY created_at DESC
                     LIMIT 1",
                    params![scope, draft.kind, draft.title, day_ago],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    db.conn.execute(
                        "UPDATE insights SET
                            severity = ?1, description = ?2, recommendation = ?3,
                            metrics = ?4, related_topics = ?5, product_name = ?6,
                            sample_feedbacks = ?7, updated_at = ?8
                         WHERE id = ?9",
                        params![
                            draft.severity,
                            draft.description,
                            draft.recommendation,
                            metrics_json,
                            topics_json,
                            draft.product_name,
                            samples_json,
                            now,
                            id,
                        ],
                    )?;
                    Ok(UpsertOutcome::Updated(id))
                }
                None => {
                    let id = format!("ins-{}", Uuid::new_v4());
                    db.conn.execute(
                        "INSERT INTO insights
                            (id, tenant_id, type, severity, title, description,
                             recommendation, metrics, related_topics, product_name,
                             sample_feedbacks, is_active, is_resolved,
                             created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, 0, ?12, ?12)",
                        params![
                            id,
                            scope,
                            draft.kind,
                            draft.severity,
                            draft.title,
                            draft.description,
                            draft.recommendation,
                            metrics_json,
                            topics_json,
                            draft.product_name,
                            samples_json,
                            now,
                        ],
                    )?;
                    Ok(UpsertOutcome::Created(id))
                }
            }
        })
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    pub fn get_insight(&self, id: &str) -> Result<Option<Insight>, DbError> {
        let sql = format!("SELECT {} FROM insights WHERE id = ?1", INSIGHT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], raw_insight_row)?;
        match rows.next() {
            Some(row) => Ok(Some(hydrate_insight(row?)?)),
            None => Ok(None),
        }
    }

    /// List insights, highest severity first, newest first within a band.
    pub fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, DbError> {
        let mut sql = format!("SELECT {} FROM insights WHERE 1=1", INSIGHT_COLUMNS);
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(scope) = &filter.scope {
            args.push(Box::new(scope.clone()));
            sql.push_str(&format!(" AND tenant_id IS ?{}", args.len()));
        }
        if let Some(kind) = filter.kind {
            args.push(Box::new(kind));
            sql.push_str(&format!(" AND type = ?{}", args.len()));
        }
        if let Some(severity) = filter.severity {
            args.push(Box::new(severity));
            sql.push_str(&format!(" AND severity = ?{}", args.len()));
        }
        if let Some(active) = filter.is_active {
            args.push(Box::new(active));
            sql.push_str(&format!(" AND is_active = ?{}", args.len()));
        }
        if let Some(resolved) = filter.is_resolved {
            args.push(Box::new(resolved));
            sql.push_str(&format!(" AND is_resolved = ?{}", args.len()));
        }

        sql.push_str(
            " ORDER BY CASE severity
                 WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0
               END DESC, created_at DESC",
        );

        if let Some(limit) = filter.limit {
            args.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", args.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), raw_insight_row)?;

        let mut insights = Vec::new();
        for row in rows {
            insights.push(hydrate_insight(row?)?);
        }
        Ok(insights)
    }

    // =========================================================================
    // Resolution (external action; engine runs never call these)
    // =========================================================================

    /// Mark an insight resolved with optional notes.
    pub fn resolve_insight(&self, id: &str, notes: Option<&str>) -> Result<(), DbError> {
        let now = ts(Utc::now());
        let changed = self.conn.execute(
            "UPDATE insights SET
                is_resolved = 1, resolved_at = ?1, resolved_notes = ?2, updated_at = ?1
             WHERE id = ?3",
            params![now, notes, id],
        )?;
        if changed == 0 {
            return Err(DbError::InsightNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Reopen a resolved insight, clearing resolution state.
    pub fn reactivate_insight(&self, id: &str) -> Result<(), DbError> {
        let now = ts(Utc::now());
        let changed = self.conn.execute(
            "UPDATE insights SET
                is_resolved = 0, resolved_at = NULL, resolved_notes = NULL,
                is_active = 1, updated_at = ?1
             WHERE id = ?2",
            params![now, id],
        )?;
        if changed == 0 {
            return Err(DbError::InsightNotFound(id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Retention sweep
    // =========================================================================

    /// Deactivate resolved insights whose resolution is older than the
    /// horizon. Rows are never deleted. Returns the number deactivated.
    pub fn deactivate_resolved_insights(&self, older_than_days: i64) -> Result<usize, DbError> {
        let cutoff = ts(Utc::now() - Duration::days(older_than_days));
        let changed = self.conn.execute(
            "UPDATE insights SET is_active = 0, updated_at = ?1
             WHERE is_resolved = 1 AND is_active = 1 AND resolved_at < ?2",
            params![ts(Utc::now()), cutoff],
        )?;
        Ok(changed)
    }

    // =========================================================================
    // Scan bookkeeping
    // =========================================================================

    /// Record when a detector last ran and how many drafts it produced.
    pub fn record_scan_state(&self, detector_name: &str, insight_count: usize) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO scan_state (detector_name, last_run_at, last_insight_count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(detector_name) DO UPDATE SET
                 last_run_at = excluded.last_run_at,
                 last_insight_count = excluded.last_insight_count",
            params![detector_name, ts(Utc::now()), insight_count as i64],
        )?;
        Ok(())
    }
}

// Raw column tuple before JSON/timestamp hydration.
type RawInsightRow = (
    String,
    Option<String>,
    InsightType,
    Severity,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    bool,
    bool,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn raw_insight_row(row: &Row<'_>) -> rusqlite::Result<RawInsightRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
        row.get(16)?,
    ))
}

fn hydrate_insight(raw: RawInsightRow) -> Result<Insight, DbError> {
    let (
        id,
        tenant_id,
        kind,
        severity,
        title,
        description,
        recommendation,
        metrics_json,
        topics_json,
        product_name,
        samples_json,
        is_active,
        is_resolved,
        resolved_at,
        resolved_notes,
        created_at,
        updated_at,
    ) = raw;

    Ok(Insight {
        id,
        tenant_id,
        kind,
        severity,
        title,
        description,
        recommendation,
        metrics: serde_json::from_str(&metrics_json)?,
        related_topics: serde_json::from_str(&topics_json)?,
        product_name,
        sample_feedbacks: serde_json::from_str(&samples_json)?,
        is_active,
        is_resolved,
        resolved_at: resolved_at.as_deref().map(parse_ts).transpose()?,
        resolved_notes,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use serde_json::json;

    fn draft(kind: InsightType, title: &str) -> InsightDraft {
        InsightDraft {
            kind,
            severity: Severity::Medium,
            title: title.to_string(),
            description: "6 customers mentioned issues with 'delivery'".to_string(),
            recommendation: "Review logistics processes.".to_string(),
            metrics: json!({"occurrences": 6, "percentage": 30.0}),
            related_topics: vec!["delivery".to_string()],
            product_name: None,
            sample_feedbacks: Vec::new(),
        }
    }

    fn active_count(db: &FeedbackDb) -> usize {
        db.list_insights(&InsightFilter {
            is_active: Some(true),
            ..Default::default()
        })
        .unwrap()
        .len()
    }

    #[test]
    fn upsert_creates_then_updates_within_24h() {
        let db = test_db();
        let d = draft(InsightType::RecurringComplaint, "Recurring Complaint: Delivery");

        let first = db.upsert_insight(Some("t1"), &d).unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));

        let mut d2 = d.clone();
        d2.severity = Severity::High;
        d2.description = "9 customers mentioned issues with 'delivery'".to_string();
        let second = db.upsert_insight(Some("t1"), &d2).unwrap();
        assert!(matches!(second, UpsertOutcome::Updated(_)));
        assert_eq!(first.id(), second.id());

        assert_eq!(active_count(&db), 1, "dedup must not duplicate");
        let stored = db.get_insight(first.id()).unwrap().unwrap();
        assert_eq!(stored.severity, Severity::High);
        assert!(stored.description.starts_with("9 customers"));
    }

    #[test]
    fn upsert_creates_new_row_when_match_is_older_than_24h() {
        let db = test_db();
        let d = draft(InsightType::RecurringComplaint, "Recurring Complaint: Delivery");
        let first = db.upsert_insight(Some("t1"), &d).unwrap();

        // Backdate the first row past the dedup window
        let two_days_ago = ts(Utc::now() - Duration::days(2));
        db.conn_ref()
            .execute(
                "UPDATE insights SET created_at = ?1 WHERE id = ?2",
                params![two_days_ago, first.id()],
            )
            .unwrap();

        let second = db.upsert_insight(Some("t1"), &d).unwrap();
        assert!(matches!(second, UpsertOutcome::Created(_)));
        assert_eq!(active_count(&db), 2);
    }

    #[test]
    fn dedup_key_separates_scopes_and_types() {
        let db = test_db();
        let d = draft(InsightType::RecurringComplaint, "Recurring Complaint: Delivery");

        db.upsert_insight(Some("t1"), &d).unwrap();
        db.upsert_insight(Some("t2"), &d).unwrap();
        db.upsert_insight(None, &d).unwrap();

        let mut praise = d.clone();
        praise.kind = InsightType::RecurringPraise;
        db.upsert_insight(Some("t1"), &praise).unwrap();

        assert_eq!(active_count(&db), 4);

        // Global dedup still collapses on repeat
        let again = db.upsert_insight(None, &d).unwrap();
        assert!(matches!(again, UpsertOutcome::Updated(_)));
        assert_eq!(active_count(&db), 4);
    }

    #[test]
    fn overwrite_preserves_resolution_fields() {
        let db = test_db();
        let d = draft(InsightType::ProductIssue, "Product Alert: Widget A");
        let outcome = db.upsert_insight(Some("t1"), &d).unwrap();

        db.resolve_insight(outcome.id(), Some("Shipped a hotfix"))
            .unwrap();

        // Regeneration within 24h overwrites content but not resolution
        let mut d2 = d.clone();
        d2.severity = Severity::High;
        db.upsert_insight(Some("t1"), &d2).unwrap();

        let stored = db.get_insight(outcome.id()).unwrap().unwrap();
        assert!(stored.is_resolved);
        assert!(stored.resolved_at.is_some());
        assert_eq!(stored.resolved_notes.as_deref(), Some("Shipped a hotfix"));
        assert_eq!(stored.severity, Severity::High, "content still overwritten");
    }

    #[test]
    fn resolve_then_reactivate() {
        let db = test_db();
        let d = draft(InsightType::UrgentAction, "4 Urgent Issues in Past Week");
        let outcome = db.upsert_insight(None, &d).unwrap();

        db.resolve_insight(outcome.id(), None).unwrap();
        let resolved = db.get_insight(outcome.id()).unwrap().unwrap();
        assert!(resolved.is_resolved);

        db.reactivate_insight(outcome.id()).unwrap();
        let reopened = db.get_insight(outcome.id()).unwrap().unwrap();
        assert!(!reopened.is_resolved);
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.is_active);
    }

    #[test]
    fn resolve_unknown_id_errors() {
        let db = test_db();
        let err = db.resolve_insight("ins-missing", None).unwrap_err();
        assert!(matches!(err, DbError::InsightNotFound(_)));
    }

    #[test]
    fn retention_sweep_deactivates_old_resolved_only() {
        let db = test_db();

        let stale = db
            .upsert_insight(None, &draft(InsightType::RecurringComplaint, "Old"))
            .unwrap();
        db.resolve_insight(stale.id(), None).unwrap();
        db.conn_ref()
            .execute(
                "UPDATE insights SET resolved_at = ?1 WHERE id = ?2",
                params![ts(Utc::now() - Duration::days(40)), stale.id()],
            )
            .unwrap();

        let fresh = db
            .upsert_insight(None, &draft(InsightType::RecurringComplaint, "Fresh"))
            .unwrap();
        db.resolve_insight(fresh.id(), None).unwrap();

        let open = db
            .upsert_insight(None, &draft(InsightType::RecurringComplaint, "Open"))
            .unwrap();

        let swept = db.deactivate_resolved_insights(30).unwrap();
        assert_eq!(swept, 1);

        assert!(!db.get_insight(stale.id()).unwrap().unwrap().is_active);
        assert!(db.get_insight(fresh.id()).unwrap().unwrap().is_active);
        assert!(db.get_insight(open.id()).unwrap().unwrap().is_active);

        // Sweep deactivates, never deletes
        assert!(db.get_insight(stale.id()).unwrap().is_some());
    }

    #[test]
    fn list_filters_and_orders_by_severity() {
        let db = test_db();

        let mut low = draft(InsightType::RecurringPraise, "Strength: Service");
        low.severity = Severity::Low;
        db.upsert_insight(Some("t1"), &low).unwrap();

        let mut critical = draft(InsightType::UrgentAction, "3 Urgent Issues in Past Week");
        critical.severity = Severity::Critical;
        db.upsert_insight(Some("t1"), &critical).unwrap();

        let mut high = draft(InsightType::ProductIssue, "Product Alert: Widget A");
        high.severity = Severity::High;
        db.upsert_insight(Some("t2"), &high).unwrap();

        let all = db.list_insights(&InsightFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].severity, Severity::Critical);
        assert_eq!(all[1].severity, Severity::High);
        assert_eq!(all[2].severity, Severity::Low);

        let t1_only = db
            .list_insights(&InsightFilter {
                scope: Some(Some("t1".to_string())),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(t1_only.len(), 2);

        let urgent_only = db
            .list_insights(&InsightFilter {
                kind: Some(InsightType::UrgentAction),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(urgent_only.len(), 1);

        let limited = db
            .list_insights(&InsightFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].severity, Severity::Critical);
    }

    #[test]
    fn metrics_and_samples_round_trip() {
        let db = test_db();
        let mut d = draft(InsightType::CriticalFeedback, "Critical Priority Issues Detected");
        d.metrics = json!({"count": 2, "urgency_level": "critical", "avg_rating": 1.0});
        d.sample_feedbacks = vec![crate::types::SampleFeedback {
            id: "f1".to_string(),
            text: "Совершенно недопустимо".to_string(),
            rating: Some(1),
            product: Some("Widget A".to_string()),
            topics: Some(vec!["quality".to_string()]),
            processed_at: Some(Utc::now()),
        }];

        let outcome = db.upsert_insight(Some("t1"), &d).unwrap();
        let stored = db.get_insight(outcome.id()).unwrap().unwrap();
        assert_eq!(stored.metrics["urgency_level"], "critical");
        assert_eq!(stored.sample_feedbacks.len(), 1);
        assert_eq!(stored.sample_feedbacks[0].rating, Some(1));
        assert_eq!(
            stored.sample_feedbacks[0].product.as_deref(),
            Some("Widget A")
        );
    }
}
