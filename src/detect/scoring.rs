//! Shared severity scoring and canned-recommendation helpers.

use crate::types::Severity;

/// Severity from how widespread a finding is. Both axes escalate: a topic
/// qualifies for a band by crossing either the percentage or the absolute
/// count threshold.
pub fn severity_for(count: usize, percentage: f64) -> Severity {
    if percentage > 50.0 || count > 20 {
        Severity::Critical
    } else if percentage > 30.0 || count > 10 {
        Severity::High
    } else if percentage > 15.0 || count > 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Canned remediation lines keyed by topic substring.
const TOPIC_RECOMMENDATIONS: &[(&str, &str)] = &[
    (
        "delivery",
        "Review logistics processes. Consider partnering with faster shipping providers.",
    ),
    (
        "quality",
        "Conduct quality assurance review. Inspect manufacturing processes.",
    ),
    (
        "service",
        "Provide additional customer service training. Review response protocols.",
    ),
    (
        "price",
        "Analyze pricing strategy. Consider competitor pricing and value proposition.",
    ),
    (
        "packaging",
        "Review packaging materials and methods. Ensure adequate protection.",
    ),
    (
        "performance",
        "Conduct technical performance testing. Optimize system resources.",
    ),
    (
        "battery",
        "Test battery performance. Consider hardware or software optimizations.",
    ),
];

/// Recommendation for a complaint topic: first matching substring wins,
/// case-insensitive; generic investigate-and-gather fallback otherwise.
pub fn recommendation_for_topic(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    for (key, rec) in TOPIC_RECOMMENDATIONS {
        if lowered.contains(key) {
            return (*rec).to_string();
        }
    }
    format!(
        "Investigate issues related to {}. Gather more customer feedback and implement targeted improvements.",
        topic
    )
}

/// Product-level recommendation templated with the top issues, or a generic
/// quality-review message when no issues were attributable.
pub fn recommendation_for_product(product: &str, issues: &[String]) -> String {
    if issues.is_empty() {
        return format!(
            "Review {} for quality issues. Conduct customer interviews.",
            product
        );
    }

    let issue_str = issues
        .iter()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Priority actions for {}:\n\
         1. Address {} immediately\n\
         2. Contact affected customers\n\
         3. Consider product recall if safety-critical\n\
         4. Improve quality control processes",
        product, issue_str
    )
}

/// Word-wise title casing: the first letter of every alphabetic run is
/// uppercased, the rest lowercased. Non-alphabetic characters reset the run,
/// so "wi-fi setup" becomes "Wi-Fi Setup".
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(severity_for(3, 10.0), Severity::Low);
        assert_eq!(severity_for(6, 10.0), Severity::Medium);
        assert_eq!(severity_for(3, 16.0), Severity::Medium);
        assert_eq!(severity_for(11, 10.0), Severity::High);
        assert_eq!(severity_for(3, 31.0), Severity::High);
        assert_eq!(severity_for(21, 10.0), Severity::Critical);
        assert_eq!(severity_for(3, 51.0), Severity::Critical);
    }

    #[test]
    fn severity_boundaries_are_exclusive() {
        // 30% is not >30, 15% is not >15, 50% is not >50
        assert_eq!(severity_for(6, 30.0), Severity::Medium);
        assert_eq!(severity_for(0, 15.0), Severity::Low);
        assert_eq!(severity_for(0, 50.0), Severity::High);
        // counts: 5 is not >5, 10 is not >10, 20 is not >20
        assert_eq!(severity_for(5, 0.0), Severity::Low);
        assert_eq!(severity_for(10, 16.0), Severity::Medium);
        assert_eq!(severity_for(20, 31.0), Severity::High);
    }

    #[test]
    fn severity_is_monotonic() {
        let counts = [0usize, 3, 5, 6, 10, 11, 20, 21, 40];
        let pcts = [0.0f64, 10.0, 15.1, 16.0, 30.1, 40.0, 50.1, 80.0];
        for (i, &c1) in counts.iter().enumerate() {
            for &c2 in &counts[i..] {
                for &p in &pcts {
                    assert!(
                        severity_for(c1, p) <= severity_for(c2, p),
                        "count {} -> {} regressed severity at {}%",
                        c1,
                        c2,
                        p
                    );
                }
            }
        }
        for &c in &counts {
            for (i, &p1) in pcts.iter().enumerate() {
                for &p2 in &pcts[i..] {
                    assert!(severity_for(c, p1) <= severity_for(c, p2));
                }
            }
        }
    }

    #[test]
    fn topic_recommendation_matches_substring_case_insensitive() {
        assert!(recommendation_for_topic("Late Delivery").contains("logistics"));
        assert!(recommendation_for_topic("BATTERY LIFE").contains("battery performance"));
        let generic = recommendation_for_topic("app crashes");
        assert!(generic.contains("Investigate issues related to app crashes"));
    }

    #[test]
    fn product_recommendation_uses_top_two_issues() {
        let rec = recommendation_for_product(
            "Widget A",
            &[
                "quality".to_string(),
                "packaging".to_string(),
                "price".to_string(),
            ],
        );
        assert!(rec.contains("Address quality, packaging immediately"));
        assert!(!rec.contains("price"));

        let fallback = recommendation_for_product("Widget B", &[]);
        assert!(fallback.contains("Review Widget B for quality issues"));
    }

    #[test]
    fn title_case_handles_separators() {
        assert_eq!(title_case("delivery"), "Delivery");
        assert_eq!(title_case("customer service"), "Customer Service");
        assert_eq!(title_case("wi-fi setup"), "Wi-Fi Setup");
        assert_eq!(title_case("BATTERY LIFE"), "Battery Life");
    }
}
