//! Pattern detectors for insight generation.
//!
//! Each detector is a pure function over the scoped, time-windowed feedback
//! snapshot and returns zero or more `InsightDraft` values. Detectors do no
//! I/O and share no state; slicing by sentiment/urgency/product happens in
//! memory over the one snapshot the engine fetched.

use std::collections::HashMap;

use chrono::Duration;
use serde_json::json;

use super::engine::DetectorContext;
use super::scoring::{
    recommendation_for_product, recommendation_for_topic, severity_for, title_case,
};
use crate::types::{
    FeedbackRecord, InsightDraft, InsightType, SampleFeedback, Sentiment, Severity, Urgency,
};

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Count topic occurrences across records and rank them: count descending,
/// topic ascending on ties so runs are deterministic.
fn ranked_topic_counts(records: &[&FeedbackRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        for topic in &record.topics {
            *counts.entry(topic.as_str()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(topic, count)| (topic.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

// ---------------------------------------------------------------------------
// Detector 1: Recurring complaints
// ---------------------------------------------------------------------------

/// Topics appearing in at least 20% of negative feedback (absolute floor of
/// 3 mentions), top 10 by count.
pub fn detect_recurring_complaints(
    items: &[FeedbackRecord],
    ctx: &DetectorContext,
) -> Vec<InsightDraft> {
    let negatives: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.sentiment == Sentiment::Negative)
        .collect();

    if negatives.len() < 3 {
        return Vec::new();
    }

    // Per-topic samples for traceability, collected in encounter order
    let mut samples: HashMap<&str, Vec<SampleFeedback>> = HashMap::new();
    for record in &negatives {
        for topic in &record.topics {
            samples
                .entry(topic.as_str())
                .or_default()
                .push(SampleFeedback::excerpt(record, 100));
        }
    }

    let total_negative = negatives.len();
    let threshold = f64::max(3.0, total_negative as f64 * 0.2);

    let mut insights = Vec::new();
    for (topic, count) in ranked_topic_counts(&negatives).into_iter().take(10) {
        if (count as f64) < threshold {
            continue;
        }
        let percentage = count as f64 / total_negative as f64 * 100.0;

        insights.push(InsightDraft {
            kind: InsightType::RecurringComplaint,
            severity: severity_for(count, percentage),
            title: format!("Recurring Complaint: {}", title_case(&topic)),
            description: format!(
                "{} customers ({:.1}% of negative feedback) mentioned issues with '{}' in the last {} days.",
                count, percentage, topic, ctx.days_back
            ),
            recommendation: recommendation_for_topic(&topic),
            metrics: json!({
                "occurrences": count,
                "percentage": round2(percentage),
                "total_negative": total_negative,
            }),
            related_topics: vec![topic.clone()],
            product_name: None,
            sample_feedbacks: samples
                .get(topic.as_str())
                .map(|s| s.iter().take(3).cloned().collect())
                .unwrap_or_default(),
        });
    }

    insights
}

// ---------------------------------------------------------------------------
// Detector 2: Recurring praise
// ---------------------------------------------------------------------------

/// Mirror of the complaint detector on positive feedback. Praise is good
/// news, so severity stays low and the cap is tighter (top 5).
pub fn detect_recurring_praise(
    items: &[FeedbackRecord],
    _ctx: &DetectorContext,
) -> Vec<InsightDraft> {
    let positives: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.sentiment == Sentiment::Positive)
        .collect();

    if positives.len() < 3 {
        return Vec::new();
    }

    let total_positive = positives.len();
    let threshold = f64::max(3.0, total_positive as f64 * 0.2);

    let mut insights = Vec::new();
    for (topic, count) in ranked_topic_counts(&positives).into_iter().take(5) {
        if (count as f64) < threshold {
            continue;
        }
        let percentage = count as f64 / total_positive as f64 * 100.0;

        insights.push(InsightDraft {
            kind: InsightType::RecurringPraise,
            severity: Severity::Low,
            title: format!("Strength: {}", title_case(&topic)),
            description: format!(
                "{} customers ({:.1}% of positive feedback) praised '{}'. This is a key strength to maintain.",
                count, percentage, topic
            ),
            recommendation: format!(
                "Continue maintaining high standards for {}. Consider highlighting this in marketing.",
                topic
            ),
            metrics: json!({
                "occurrences": count,
                "percentage": round2(percentage),
                "total_positive": total_positive,
            }),
            related_topics: vec![topic],
            product_name: None,
            sample_feedbacks: Vec::new(),
        });
    }

    insights
}

// ---------------------------------------------------------------------------
// Detector 3: Critical feedback
// ---------------------------------------------------------------------------

/// Strongly dissatisfied customers: negative sentiment with high/critical
/// urgency, or a 1-star rating. The 10 most recent qualifying items are
/// grouped by urgency, one insight per urgency level present.
pub fn detect_critical_feedback(
    items: &[FeedbackRecord],
    _ctx: &DetectorContext,
) -> Vec<InsightDraft> {
    let mut selected: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| {
            (f.sentiment == Sentiment::Negative && f.urgency.is_urgent()) || f.rating == Some(1)
        })
        .collect();
    selected.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
    selected.truncate(10);

    if selected.is_empty() {
        return Vec::new();
    }

    // Group by urgency in encounter order
    let mut groups: Vec<(Urgency, Vec<&FeedbackRecord>)> = Vec::new();
    for record in selected {
        match groups.iter_mut().find(|(u, _)| *u == record.urgency) {
            Some((_, members)) => members.push(record),
            None => groups.push((record.urgency, vec![record])),
        }
    }

    let mut insights = Vec::new();
    for (urgency, members) in groups {
        let severity = match urgency {
            Urgency::Critical => Severity::Critical,
            Urgency::High => Severity::High,
            // medium maps straight across; anything else (1-star items with
            // low urgency) defaults to medium
            _ => Severity::Medium,
        };

        // Rating average: sum of present ratings divided by the full group
        // size, so unrated items drag the average down. Dashboards already
        // interpret the metric this way; keep it as is.
        let rating_sum: i64 = members.iter().filter_map(|f| f.rating).map(i64::from).sum();
        let avg_rating = rating_sum as f64 / members.len() as f64;

        let mut related_topics: Vec<String> = Vec::new();
        for member in &members {
            for topic in &member.topics {
                if !related_topics.contains(topic) {
                    related_topics.push(topic.clone());
                }
            }
        }
        related_topics.truncate(5);

        insights.push(InsightDraft {
            kind: InsightType::CriticalFeedback,
            severity,
            title: format!("{} Priority Issues Detected", title_case(urgency.as_str())),
            description: format!(
                "{} {} priority issues require immediate attention. These customers expressed strong dissatisfaction.",
                members.len(),
                urgency
            ),
            recommendation:
                "Reach out to affected customers immediately. Investigate root causes and implement fixes."
                    .to_string(),
            metrics: json!({
                "count": members.len(),
                "urgency_level": urgency.as_str(),
                "avg_rating": avg_rating,
            }),
            related_topics,
            product_name: None,
            sample_feedbacks: members
                .iter()
                .take(3)
                .map(|f| SampleFeedback::detailed(f, 150))
                .collect(),
        });
    }

    insights
}

// ---------------------------------------------------------------------------
// Detector 4: Product insights
// ---------------------------------------------------------------------------

struct ProductAgg {
    name: String,
    total: usize,
    score_sum: f64,
    negative: usize,
    positive: usize,
}

/// Per-product performance: an alert when negativity dominates, a highlight
/// when a product clearly outperforms, silence for the lukewarm middle band.
pub fn detect_product_insights(
    items: &[FeedbackRecord],
    _ctx: &DetectorContext,
) -> Vec<InsightDraft> {
    let with_product: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.product_name.as_deref().is_some_and(|p| !p.is_empty()))
        .collect();

    if with_product.len() < 5 {
        return Vec::new();
    }

    // Aggregate per product in encounter order; stable sort keeps tie order
    // deterministic when totals match
    let mut aggs: Vec<ProductAgg> = Vec::new();
    for record in &with_product {
        let name = record.product_name.as_deref().unwrap_or_default();
        let idx = match aggs.iter().position(|a| a.name == name) {
            Some(idx) => idx,
            None => {
                aggs.push(ProductAgg {
                    name: name.to_string(),
                    total: 0,
                    score_sum: 0.0,
                    negative: 0,
                    positive: 0,
                });
                aggs.len() - 1
            }
        };
        let agg = &mut aggs[idx];
        agg.total += 1;
        agg.score_sum += record.sentiment_score;
        match record.sentiment {
            Sentiment::Negative => agg.negative += 1,
            Sentiment::Positive => agg.positive += 1,
            Sentiment::Neutral => {}
        }
    }
    aggs.sort_by(|a, b| b.total.cmp(&a.total));

    let mut insights = Vec::new();
    for agg in aggs.iter().take(10) {
        if agg.total < 5 {
            continue;
        }

        let avg_sentiment = agg.score_sum / agg.total as f64;
        let negative_pct = agg.negative as f64 / agg.total as f64 * 100.0;

        if negative_pct > 40.0 || avg_sentiment < 0.5 {
            let severity = if negative_pct > 60.0 {
                Severity::High
            } else {
                Severity::Medium
            };

            // Separate pass over this product's negative items to surface
            // the dominant issues
            let product_negatives: Vec<&FeedbackRecord> = with_product
                .iter()
                .filter(|f| {
                    f.product_name.as_deref() == Some(agg.name.as_str())
                        && f.sentiment == Sentiment::Negative
                })
                .copied()
                .collect();
            let top_issues: Vec<String> = ranked_topic_counts(&product_negatives)
                .into_iter()
                .take(3)
                .map(|(topic, _)| topic)
                .collect();

            let issues_str = if top_issues.is_empty() {
                "various".to_string()
            } else {
                top_issues.join(", ")
            };

            insights.push(InsightDraft {
                kind: InsightType::ProductIssue,
                severity,
                title: format!("Product Alert: {}", agg.name),
                description: format!(
                    "{} has {:.1}% negative feedback ({}/{} reviews). Common issues: {}",
                    agg.name, negative_pct, agg.negative, agg.total, issues_str
                ),
                recommendation: recommendation_for_product(&agg.name, &top_issues),
                metrics: json!({
                    "total_feedback": agg.total,
                    "negative_percentage": round2(negative_pct),
                    "avg_sentiment_score": round2(avg_sentiment),
                    "negative_count": agg.negative,
                    "positive_count": agg.positive,
                }),
                related_topics: top_issues,
                product_name: Some(agg.name.clone()),
                sample_feedbacks: Vec::new(),
            });
        } else if negative_pct < 20.0 && avg_sentiment > 0.7 {
            let positive_pct = agg.positive as f64 / agg.total as f64 * 100.0;

            insights.push(InsightDraft {
                kind: InsightType::ProductSuccess,
                severity: Severity::Low,
                title: format!("Top Performer: {}", agg.name),
                description: format!(
                    "{} is performing excellently with {}/{} positive reviews ({:.1}%).",
                    agg.name, agg.positive, agg.total, positive_pct
                ),
                recommendation: format!(
                    "Use {} as a model for other products. Consider increasing marketing focus.",
                    agg.name
                ),
                metrics: json!({
                    "total_feedback": agg.total,
                    "positive_percentage": round2(positive_pct),
                    "avg_sentiment_score": round2(avg_sentiment),
                }),
                related_topics: Vec::new(),
                product_name: Some(agg.name.clone()),
                sample_feedbacks: Vec::new(),
            });
        }
        // 20-40% negative with middling sentiment: no insight by design
    }

    insights
}

// ---------------------------------------------------------------------------
// Detector 5: Sentiment trend
// ---------------------------------------------------------------------------

/// Compare the two halves of the window. Emits at most one insight per run;
/// the decline branch is checked first and wins if both thresholds cross in
/// conflicting directions.
pub fn detect_sentiment_trend(
    items: &[FeedbackRecord],
    ctx: &DetectorContext,
) -> Vec<InsightDraft> {
    let midpoint = ctx.window_start + Duration::seconds(ctx.days_back * 86_400 / 2);

    let first: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.processed_at < midpoint)
        .collect();
    let second: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.processed_at >= midpoint)
        .collect();

    if first.len() < 5 || second.len() < 5 {
        return Vec::new();
    }

    let avg = |half: &[&FeedbackRecord]| {
        half.iter().map(|f| f.sentiment_score).sum::<f64>() / half.len() as f64
    };
    let neg_pct = |half: &[&FeedbackRecord]| {
        half.iter()
            .filter(|f| f.sentiment == Sentiment::Negative)
            .count() as f64
            / half.len() as f64
            * 100.0
    };

    let first_avg = avg(&first);
    let second_avg = avg(&second);
    let first_neg_pct = neg_pct(&first);
    let second_neg_pct = neg_pct(&second);

    let sentiment_change = second_avg - first_avg;
    let negative_change = second_neg_pct - first_neg_pct;

    if sentiment_change.abs() <= 0.1 && negative_change.abs() <= 10.0 {
        return Vec::new();
    }

    let metrics = json!({
        "sentiment_change": round3(sentiment_change),
        "negative_change": round2(negative_change),
        "first_period_avg": round2(first_avg),
        "second_period_avg": round2(second_avg),
    });

    let draft = if sentiment_change < -0.1 || negative_change > 10.0 {
        InsightDraft {
            kind: InsightType::SentimentTrend,
            severity: Severity::High,
            title: "Declining Customer Satisfaction".to_string(),
            description: format!(
                "Sentiment has declined by {:.1}% over the last {} days. \
                 Negative feedback increased from {:.1}% to {:.1}%.",
                sentiment_change.abs() * 100.0,
                ctx.days_back,
                first_neg_pct,
                second_neg_pct
            ),
            recommendation:
                "Investigate recent changes (product updates, policy changes, etc.). Address emerging issues quickly."
                    .to_string(),
            metrics,
            related_topics: Vec::new(),
            product_name: None,
            sample_feedbacks: Vec::new(),
        }
    } else {
        InsightDraft {
            kind: InsightType::SentimentTrend,
            severity: Severity::Low,
            title: "Improving Customer Satisfaction".to_string(),
            description: format!(
                "Great news! Sentiment has improved by {:.1}% over the last {} days. \
                 Negative feedback decreased from {:.1}% to {:.1}%.",
                sentiment_change.abs() * 100.0,
                ctx.days_back,
                first_neg_pct,
                second_neg_pct
            ),
            recommendation:
                "Continue current strategies. Document what's working well for future reference."
                    .to_string(),
            metrics,
            related_topics: Vec::new(),
            product_name: None,
            sample_feedbacks: Vec::new(),
        }
    };

    vec![draft]
}

// ---------------------------------------------------------------------------
// Detector 6: Urgent issues
// ---------------------------------------------------------------------------

/// High/critical-urgency feedback from the last 7 days, regardless of the
/// configured window. At most one insight per run; its existence at all is a
/// critical signal.
pub fn detect_urgent_issues(items: &[FeedbackRecord], ctx: &DetectorContext) -> Vec<InsightDraft> {
    let recent_cutoff = ctx.now - Duration::days(7);
    let urgent: Vec<&FeedbackRecord> = items
        .iter()
        .filter(|f| f.urgency.is_urgent() && f.processed_at >= recent_cutoff)
        .collect();

    if urgent.is_empty() {
        return Vec::new();
    }

    let urgent_count = urgent.len();
    let critical_count = urgent
        .iter()
        .filter(|f| f.urgency == Urgency::Critical)
        .count();
    let high_count = urgent.iter().filter(|f| f.urgency == Urgency::High).count();

    let top_topics: Vec<String> = ranked_topic_counts(&urgent)
        .into_iter()
        .take(3)
        .map(|(topic, _)| topic)
        .collect();
    let topics_str = if top_topics.is_empty() {
        "various".to_string()
    } else {
        top_topics.join(", ")
    };

    vec![InsightDraft {
        kind: InsightType::UrgentAction,
        severity: Severity::Critical,
        title: format!("{} Urgent Issues in Past Week", urgent_count),
        description: format!(
            "{} urgent issues detected in the last 7 days. Top concerns: {}. Immediate action required.",
            urgent_count, topics_str
        ),
        recommendation: "1. Review all urgent feedback immediately\n\
                         2. Contact affected customers within 24 hours\n\
                         3. Escalate to relevant teams\n\
                         4. Track resolution progress"
            .to_string(),
        metrics: json!({
            "urgent_count": urgent_count,
            "timeframe_days": 7,
            "critical_count": critical_count,
            "high_count": high_count,
        }),
        related_topics: top_topics,
        product_name: None,
        sample_feedbacks: Vec::new(),
    }]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
