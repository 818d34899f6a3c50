//! Delegation rules
//!
//! After a handler answers, its response (and the original query) is matched
//! against an ordered `(from, to, source, pattern)` table to find further
//! handlers worth consulting.

use crate::registry::HandlerRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Text a delegation rule is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    /// The consulted handler's response text
    Response,
    /// The user's original query
    Query,
}

pub struct DelegationRule {
    pub from: &'static str,
    pub to: &'static str,
    pub source: RuleSource,
    pub pattern: Regex,
}

fn rule(from: &'static str, to: &'static str, source: RuleSource, keywords: &[&str]) -> DelegationRule {
    let pattern = format!("(?i){}", keywords.join("|"));
    DelegationRule {
        from,
        to,
        source,
        pattern: Regex::new(&pattern).expect("delegation pattern is valid"),
    }
}

pub static DELEGATION_RULES: Lazy<Vec<DelegationRule>> = Lazy::new(|| {
    use RuleSource::{Query, Response};

    vec![
        rule(
            "revenue",
            "legal",
            Response,
            &[
                "legal review",
                "attorney",
                "compliance",
                "contract",
                "nda",
                "legal advice",
                "regulatory",
                "due diligence",
                "liability",
            ],
        ),
        rule(
            "revenue",
            "finance",
            Response,
            &[
                "financial analysis",
                "ebitda",
                "cash flow",
                "tax implications",
                "financial review",
                "accounting",
                "valuation model",
                "financial due diligence",
            ],
        ),
        rule(
            "legal",
            "revenue",
            Response,
            &[
                "business growth",
                "revenue strategy",
                "sales optimization",
                "growth strategy",
                "revenue maximization",
                "business development",
                "market optimization",
            ],
        ),
        rule(
            "legal",
            "finance",
            Response,
            &[
                "financial impact",
                "tax",
                "ebitda",
                "financial structure",
                "cost analysis",
                "financial compliance",
            ],
        ),
        rule(
            "finance",
            "revenue",
            Response,
            &[
                "growth strategy",
                "revenue optimization",
                "sales strategy",
                "business growth",
                "market analysis",
                "business development",
            ],
        ),
        rule(
            "finance",
            "legal",
            Response,
            &[
                "legal structure",
                "compliance",
                "regulatory",
                "contract",
                "legal implications",
                "due diligence",
            ],
        ),
        rule(
            "revenue",
            "legal",
            Query,
            &["legal", "contract", "nda", "compliance", "attorney", "regulation"],
        ),
        rule(
            "revenue",
            "finance",
            Query,
            &["financial", "ebitda", "tax", r"cash.?flow", "accounting", r"financial.?analysis"],
        ),
    ]
});

const DELEGATION_REASONS: &[(&str, &str, &str)] = &[
    ("revenue", "legal", "Legal expertise needed for contracts and compliance"),
    ("revenue", "finance", "Financial analysis required for business growth strategy"),
    ("legal", "revenue", "Business growth and revenue optimization expertise needed"),
    ("legal", "finance", "Financial impact analysis required"),
    ("finance", "revenue", "Revenue optimization and growth strategy needed"),
    ("finance", "legal", "Legal structure and compliance review needed"),
];

pub const FALLBACK_REASON: &str = "Additional specialized expertise required";

/// Why `from` hands work to `to`
pub fn delegation_reason(from: &str, to: &str) -> &'static str {
    DELEGATION_REASONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, reason)| *reason)
        .unwrap_or(FALLBACK_REASON)
}

/// Handlers `current` should delegate to, in rule order
///
/// Candidates already processed, unregistered, or equal to `current` are
/// dropped; each candidate appears once.
pub fn analyze(
    current: &str,
    response_text: &str,
    original_query: &str,
    processed: &HashSet<String>,
    registry: &HandlerRegistry,
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for rule in DELEGATION_RULES.iter().filter(|r| r.from == current) {
        if rule.to == current
            || processed.contains(rule.to)
            || !registry.contains(rule.to)
            || candidates.iter().any(|c| c == rule.to)
        {
            continue;
        }

        let text = match rule.source {
            RuleSource::Response => response_text,
            RuleSource::Query => original_query,
        };
        if rule.pattern.is_match(text) {
            candidates.push(rule.to.to_string());
        }
    }

    candidates
}
