//! Shared domain types for the insight engine.
//!
//! Enums are stored in SQLite as their snake_case string form and converted
//! at the row boundary via `ToSql`/`FromSql`, so the rest of the crate works
//! with typed values rather than raw strings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Sentiment label produced by the upstream NLP pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// Urgency label produced by the upstream NLP pipeline. Ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }

    /// High or critical, the band several detectors treat as actionable.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Urgency::High | Urgency::Critical)
    }
}

/// Insight severity. Ordered low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Discriminant for the kinds of insight the detectors produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    RecurringComplaint,
    RecurringPraise,
    CriticalFeedback,
    ProductIssue,
    ProductSuccess,
    SentimentTrend,
    UrgentAction,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::RecurringComplaint => "recurring_complaint",
            InsightType::RecurringPraise => "recurring_praise",
            InsightType::CriticalFeedback => "critical_feedback",
            InsightType::ProductIssue => "product_issue",
            InsightType::ProductSuccess => "product_success",
            InsightType::SentimentTrend => "sentiment_trend",
            InsightType::UrgentAction => "urgent_action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recurring_complaint" => Some(InsightType::RecurringComplaint),
            "recurring_praise" => Some(InsightType::RecurringPraise),
            "critical_feedback" => Some(InsightType::CriticalFeedback),
            "product_issue" => Some(InsightType::ProductIssue),
            "product_success" => Some(InsightType::ProductSuccess),
            "sentiment_trend" => Some(InsightType::SentimentTrend),
            "urgent_action" => Some(InsightType::UrgentAction),
            _ => None,
        }
    }
}

macro_rules! impl_sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).ok_or(FromSqlError::InvalidType)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_sql_text_enum!(Sentiment);
impl_sql_text_enum!(Urgency);
impl_sql_text_enum!(Severity);
impl_sql_text_enum!(InsightType);

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// A processed feedback item as the engine reads it: raw fields plus the
/// upstream NLP annotations. Sentiment and urgency are always set once the
/// row exists; topics may be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub tenant_id: Option<String>,
    pub product_name: Option<String>,
    /// Star rating 1-5 where the source channel provides one.
    pub rating: Option<i32>,
    pub text: String,
    pub source: Option<String>,
    pub sentiment: Sentiment,
    pub sentiment_score: f64,
    pub topics: Vec<String>,
    pub urgency: Urgency,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// A small excerpt of a contributing feedback item, kept on the insight for
/// traceability. Critical-feedback samples carry the extra context fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFeedback {
    pub id: String,
    pub text: String,
    pub rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl SampleFeedback {
    /// Excerpt-only sample: id, text truncated to `max_chars`, rating.
    pub fn excerpt(record: &FeedbackRecord, max_chars: usize) -> Self {
        SampleFeedback {
            id: record.id.clone(),
            text: truncate_chars(&record.text, max_chars),
            rating: record.rating,
            product: None,
            topics: None,
            processed_at: None,
        }
    }

    /// Full-context sample used by the critical-feedback detector.
    pub fn detailed(record: &FeedbackRecord, max_chars: usize) -> Self {
        SampleFeedback {
            id: record.id.clone(),
            text: truncate_chars(&record.text, max_chars),
            rating: record.rating,
            product: record.product_name.clone(),
            topics: Some(record.topics.clone()),
            processed_at: Some(record.processed_at),
        }
    }
}

/// Truncate on a char boundary, never mid-codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// An insight candidate produced by a detector, prior to persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightDraft {
    #[serde(rename = "type")]
    pub kind: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    /// Quantitative evidence. Open map: values are numbers except where the
    /// stored schema carries a label (e.g. `urgency_level`).
    pub metrics: serde_json::Value,
    pub related_topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_feedbacks: Vec<SampleFeedback>,
}

/// A persisted insight row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub tenant_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub metrics: serde_json::Value,
    pub related_topics: Vec<String>,
    pub product_name: Option<String>,
    pub sample_feedbacks: Vec<SampleFeedback>,
    pub is_active: bool,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scan summary
// ---------------------------------------------------------------------------

/// Result of one orchestrator run: what was generated and what was stored.
/// `total_saved` can fall short of `total_generated` when individual drafts
/// fail to persist; those failures are logged and skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_generated: usize,
    pub total_saved: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub scope: Option<String>,
    pub days_analyzed: i64,
}
