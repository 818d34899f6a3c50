//! Pattern tables for the deterministic classification tiers
//!
//! Tables are ordered; the first matching explicit rule wins and heuristic
//! results are reported in table order. Keys that are not registered are
//! skipped, so a deployment without e.g. a finance handler never routes to one.

use crate::registry::HandlerRegistry;
use once_cell::sync::Lazy;
use regex::Regex;

/// Patterns that name a handler directly
pub struct ExplicitRule {
    pub handler: &'static str,
    pub patterns: Vec<Regex>,
}

pub struct WeightedPattern {
    pub pattern: Regex,
    pub weight: f64,
}

/// Weighted keyword patterns for one handler
pub struct HeuristicRule {
    pub handler: &'static str,
    pub patterns: Vec<WeightedPattern>,
}

impl HeuristicRule {
    /// Highest weight among matching patterns
    pub fn score(&self, text: &str) -> Option<f64> {
        self.patterns
            .iter()
            .filter(|p| p.pattern.is_match(text))
            .map(|p| p.weight)
            .fold(None, |best, w| Some(best.map_or(w, |b: f64| b.max(w))))
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("classification pattern is valid"))
        .collect()
}

fn weighted(patterns: &[(&str, f64)]) -> Vec<WeightedPattern> {
    patterns
        .iter()
        .map(|(p, weight)| WeightedPattern {
            pattern: Regex::new(&format!("(?i){p}")).expect("heuristic pattern is valid"),
            weight: *weight,
        })
        .collect()
}

pub static EXPLICIT_RULES: Lazy<Vec<ExplicitRule>> = Lazy::new(|| {
    vec![
        ExplicitRule {
            handler: "revenue",
            patterns: compile(&[
                r"revenue\s+agent",
                r"talk\s+to\s+revenue",
                r"speak\s+to\s+revenue",
                r"ask\s+the\s+revenue",
                r"contact\s+revenue",
                r"revenue\s+(please|help|can|what)",
                r"\brevenue\b.*\b(agent|specialist|expert)\b",
                r"business\s+growth",
                r"maximize\s+revenue",
            ]),
        },
        ExplicitRule {
            handler: "legal",
            patterns: compile(&[
                r"legal\s+agent",
                r"lawyer\s+agent",
                r"talk\s+to\s+legal",
                r"speak\s+to\s+legal",
                r"ask\s+the\s+legal",
                r"contact\s+legal",
                r"legal\s+(please|help|can|what)",
                r"\blegal\b.*\b(agent|specialist|expert)\b",
                r"attorney\s+agent",
            ]),
        },
        ExplicitRule {
            handler: "finance",
            patterns: compile(&[
                r"finance\s+agent",
                r"financial\s+agent",
                r"talk\s+to\s+finance",
                r"speak\s+to\s+finance",
                r"ask\s+the\s+finance",
                r"contact\s+finance",
                r"finance\s+(please|help|can|what)",
                r"\bfinance\b.*\b(agent|specialist|expert)\b",
                r"financial\s+(specialist|expert|agent)",
            ]),
        },
    ]
});

pub static HEURISTIC_RULES: Lazy<Vec<HeuristicRule>> = Lazy::new(|| {
    vec![
        HeuristicRule {
            handler: "revenue",
            patterns: weighted(&[
                (r"growth|scaling|increase|revenue|maximize|optimize|profit", 0.8),
                (
                    r"business.*growth|what.*strategies|how to increase|revenue|sales|marketing",
                    0.9,
                ),
                (r"marketplace|revenue|deal|strategy|optimization", 0.7),
            ]),
        },
        HeuristicRule {
            handler: "legal",
            patterns: weighted(&[
                (
                    r"legal|contract|nda|agreement|compliance|regulation|due.?diligence",
                    0.8,
                ),
                (r"lawyer|attorney|terms|conditions|liability", 0.9),
                (r"confidentiality|non.?disclosure", 0.9),
            ]),
        },
        HeuristicRule {
            handler: "finance",
            patterns: weighted(&[
                (r"ebitda|financial|cash.?flow|profit|loss|tax|multiple", 0.8),
                (r"finance|accounting|revenue|expenses|roi|dcf", 0.8),
                (r"financial.*analysis|income.*statement|balance.*sheet", 0.9),
            ]),
        },
    ]
});

static BASIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"^(hi|hello|hey|good morning|good afternoon|good evening)\.?$",
        r"^(what do you do|how can you help|what are your capabilities|tell me about yourself)\.?\??$",
        r"^(how are you|what's new|what's up)\.?\??$",
        r"^(ok|thanks|thank you|got it|understood|alright)\.?$",
        r"^(what is this|how does this work|what's this platform)\.?\??$",
        r"^(test|testing|hello world|ping)\.?$",
        r"^.{1,10}$",
        r"^(yes|no|maybe|sure|okay)\.?$",
        r"^(good|nice|cool|great)\.?$",
        r"^(help|info|information)\.?\??$",
    ])
});

static DOMAIN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(business|company|legal|finance|revenue|market|sale|buy|sell|contract|nda|compliance|valuation|analysis)\b",
    )
    .expect("domain keyword pattern is valid")
});

const MIN_MESSAGE_CHARS: usize = 3;
const SHORT_MESSAGE_CHARS: usize = 15;

/// First registered handler whose explicit patterns match `text`
pub fn detect_explicit(text: &str, registry: &HandlerRegistry) -> Option<&'static str> {
    EXPLICIT_RULES
        .iter()
        .filter(|rule| registry.contains(rule.handler))
        .find(|rule| rule.patterns.iter().any(|p| p.is_match(text)))
        .map(|rule| rule.handler)
}

/// Greetings, acknowledgements, small talk and very short messages
pub fn is_basic_message(text: &str) -> bool {
    let trimmed = text.trim();
    let length = trimmed.chars().count();

    BASIC_PATTERNS.iter().any(|p| p.is_match(trimmed))
        || length < MIN_MESSAGE_CHARS
        || (length < SHORT_MESSAGE_CHARS && !DOMAIN_KEYWORDS.is_match(trimmed))
}

/// Heuristic confidence per registered handler, in table order
pub fn score_handlers(text: &str, registry: &HandlerRegistry) -> Vec<(String, f64)> {
    HEURISTIC_RULES
        .iter()
        .filter(|rule| registry.contains(rule.handler))
        .filter_map(|rule| rule.score(text).map(|w| (rule.handler.to_string(), w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::registry::HandlerDescriptor;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::from_config(&OrchestratorConfig::test_config())
    }

    #[test]
    fn test_explicit_match_by_name() {
        let registry = registry();
        assert_eq!(
            detect_explicit("talk to legal agent about an nda", &registry),
            Some("legal")
        );
        assert_eq!(
            detect_explicit("Can the FINANCIAL EXPERT look at this?", &registry),
            Some("finance")
        );
        assert_eq!(detect_explicit("ideas for business growth", &registry), Some("revenue"));
        assert_eq!(detect_explicit("review my contract terms", &registry), None);
    }

    #[test]
    fn test_explicit_first_table_entry_wins() {
        let registry = registry();
        assert_eq!(
            detect_explicit("ask the revenue agent and the legal agent", &registry),
            Some("revenue")
        );
    }

    #[test]
    fn test_explicit_skips_unregistered_handlers() {
        let registry = HandlerRegistry::new(
            vec![HandlerDescriptor {
                key: "general".to_string(),
                name: "General".to_string(),
                url: None,
                specialties: vec![],
            }],
            "general",
        );
        assert_eq!(detect_explicit("talk to legal agent", &registry), None);
    }

    #[test]
    fn test_basic_messages() {
        for text in ["hello", "Hi.", "thank you", "what do you do?", "ok", "  yo  ", "x"] {
            assert!(is_basic_message(text), "{text:?} should be basic");
        }
    }

    #[test]
    fn test_short_domain_message_is_not_basic() {
        assert!(!is_basic_message("nda template?"));
        assert!(!is_basic_message("How should I structure the earn-out for my acquisition?"));
        assert!(is_basic_message("how's it going"));
    }

    #[test]
    fn test_heuristic_takes_max_weight_in_table_order() {
        let scores = score_handlers("need a lawyer to review contract and cash flow", &registry());
        assert_eq!(
            scores,
            vec![("legal".to_string(), 0.9), ("finance".to_string(), 0.8)]
        );
    }

    #[test]
    fn test_heuristic_no_match() {
        assert!(score_handlers("tell me a story about dragons", &registry()).is_empty());
    }
}
