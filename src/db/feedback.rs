//! Tenant rows and the processed-feedback read path.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{parse_ts, ts, DbError, FeedbackDb};
use crate::types::{FeedbackRecord, Sentiment, Urgency};

impl FeedbackDb {
    // =========================================================================
    // Tenants
    // =========================================================================

    /// Insert a tenant or update its name in place.
    pub fn upsert_tenant(&self, id: &str, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO tenants (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn tenant_exists(&self, id: &str) -> Result<bool, DbError> {
        let exists = self
            .conn
            .prepare("SELECT 1 FROM tenants WHERE id = ?1")?
            .exists(params![id])?;
        Ok(exists)
    }

    // =========================================================================
    // Processed feedback
    // =========================================================================

    /// Insert one processed feedback row. Called by the ingestion/NLP side;
    /// the insight engine itself never writes feedback.
    pub fn insert_feedback(&self, record: &FeedbackRecord) -> Result<(), DbError> {
        let topics_json = serde_json::to_string(&record.topics)?;
        self.conn.execute(
            "INSERT INTO feedback
                (id, tenant_id, product_name, rating, text, source,
                 sentiment, sentiment_score, topics, urgency, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.tenant_id,
                record.product_name,
                record.rating,
                record.text,
                record.source,
                record.sentiment,
                record.sentiment_score,
                topics_json,
                record.urgency,
                ts(record.processed_at),
            ],
        )?;
        Ok(())
    }

    /// Fetch the full feedback window for one scope: every row processed at
    /// or after `since`, newest first. `None` scope means all tenants.
    ///
    /// This is the one snapshot the detectors share; they slice it in memory
    /// by sentiment/urgency/product instead of issuing their own queries.
    pub fn fetch_window(
        &self,
        scope: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, DbError> {
        let sql = "SELECT id, tenant_id, product_name, rating, text, source,
                          sentiment, sentiment_score, topics, urgency, processed_at
                   FROM feedback
                   WHERE processed_at >= ?1
                     AND (?2 IS NULL OR tenant_id = ?2)
                   ORDER BY processed_at DESC";

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![ts(since), scope], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i32>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Sentiment>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Urgency>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (
                id,
                tenant_id,
                product_name,
                rating,
                text,
                source,
                sentiment,
                sentiment_score,
                topics_json,
                urgency,
                processed_at,
            ) = row?;
            records.push(FeedbackRecord {
                id,
                tenant_id,
                product_name,
                rating,
                text,
                source,
                sentiment,
                sentiment_score,
                topics: serde_json::from_str(&topics_json)?,
                urgency,
                processed_at: parse_ts(&processed_at)?,
            });
        }
        Ok(records)
    }

    /// Count feedback rows for a scope (all time). Used for smoke checks.
    pub fn feedback_count(&self, scope: Option<&str>) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM feedback WHERE (?1 IS NULL OR tenant_id = ?1)",
            params![scope],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::db::test_utils::test_db;
    use crate::types::{FeedbackRecord, Sentiment, Urgency};

    fn record(id: &str, tenant: Option<&str>, days_ago: i64) -> FeedbackRecord {
        FeedbackRecord {
            id: id.to_string(),
            tenant_id: tenant.map(|t| t.to_string()),
            product_name: None,
            rating: Some(4),
            text: "Arrived on time, works great".to_string(),
            source: Some("csv".to_string()),
            sentiment: Sentiment::Positive,
            sentiment_score: 0.9,
            topics: vec!["delivery".to_string()],
            urgency: Urgency::Low,
            processed_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn fetch_window_filters_by_time_and_scope() {
        let db = test_db();
        db.upsert_tenant("t1", "Acme").unwrap();
        db.insert_feedback(&record("f1", Some("t1"), 2)).unwrap();
        db.insert_feedback(&record("f2", Some("t1"), 40)).unwrap();
        db.insert_feedback(&record("f3", Some("t2"), 2)).unwrap();
        db.insert_feedback(&record("f4", None, 2)).unwrap();

        let since = Utc::now() - Duration::days(30);

        let scoped = db.fetch_window(Some("t1"), since).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "f1");

        let global = db.fetch_window(None, since).unwrap();
        assert_eq!(global.len(), 3, "global window spans all tenants");
    }

    #[test]
    fn fetch_window_is_newest_first() {
        let db = test_db();
        db.insert_feedback(&record("old", None, 10)).unwrap();
        db.insert_feedback(&record("new", None, 1)).unwrap();

        let since = Utc::now() - Duration::days(30);
        let rows = db.fetch_window(None, since).unwrap();
        assert_eq!(rows[0].id, "new");
        assert_eq!(rows[1].id, "old");
    }

    #[test]
    fn topics_round_trip_as_json() {
        let db = test_db();
        let mut rec = record("f1", None, 1);
        rec.topics = vec!["délai de livraison".to_string(), "service".to_string()];
        db.insert_feedback(&rec).unwrap();

        let rows = db
            .fetch_window(None, Utc::now() - Duration::days(2))
            .unwrap();
        assert_eq!(rows[0].topics, rec.topics);
    }

    #[test]
    fn feedback_count_spans_all_time_per_scope() {
        let db = test_db();
        db.insert_feedback(&record("f1", Some("t1"), 2)).unwrap();
        db.insert_feedback(&record("f2", Some("t1"), 400)).unwrap();
        db.insert_feedback(&record("f3", None, 2)).unwrap();

        assert_eq!(db.feedback_count(Some("t1")).unwrap(), 2);
        assert_eq!(db.feedback_count(None).unwrap(), 3);
    }

    #[test]
    fn tenant_exists_reflects_upsert() {
        let db = test_db();
        assert!(!db.tenant_exists("t1").unwrap());
        db.upsert_tenant("t1", "Acme").unwrap();
        assert!(db.tenant_exists("t1").unwrap());
        db.upsert_tenant("t1", "Acme Renamed").unwrap();
        assert!(db.tenant_exists("t1").unwrap());
    }
}
