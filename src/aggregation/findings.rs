//! Sentence-level findings and their deduplication

use crate::delegation::AgentResult;
use std::collections::HashSet;

/// One unique sentence and the handler it is attributed to
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub agent: String,
    pub order: usize,
    pub text: String,
}

/// Split text into sentences after `.`, `!` or `?` followed by whitespace
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next)) = chars.peek() {
                if next.is_whitespace() {
                    push_trimmed(&mut sentences, &text[start..next_i]);
                    start = next_i;
                }
            }
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, sentence: &str) {
    let trimmed = sentence.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Deduplication key: lowercase, single spaces, no trailing punctuation
///
/// ```
/// use a2a_orchestrator::aggregation::findings::normalize;
///
/// assert_eq!(normalize("Review  the NDA!"), normalize("review the nda."));
/// ```
pub fn normalize(sentence: &str) -> String {
    let collapsed = sentence
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Most words a leading clause keeps
const CLAUSE_WORDS: usize = 8;

/// Opening clause of a finding, for the conclusion list
///
/// Ends at the first `.`, `!`, `?`, `,`, `;` or `:` that is followed by
/// whitespace or closes the text, and keeps at most eight words.
///
/// ```
/// use a2a_orchestrator::aggregation::findings::leading_clause;
///
/// assert_eq!(leading_clause("Cash is king, always."), "Cash is king");
/// assert_eq!(leading_clause("Version 1.2 ships in May."), "Version 1.2 ships in May");
/// ```
pub fn leading_clause(finding: &str) -> &str {
    let mut end = finding.len();
    let mut chars = finding.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?' | ',' | ';' | ':')
            && chars.peek().map_or(true, |&(_, next)| next.is_whitespace())
        {
            end = i;
            break;
        }
    }
    cap_words(finding[..end].trim())
}

fn cap_words(clause: &str) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in clause.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > CLAUSE_WORDS {
                return clause[..i].trim_end();
            }
        }
    }
    clause
}

/// Unique findings of successful results in consultation order
///
/// A sentence already produced by an earlier handler is dropped.
pub fn collect_findings(results: &[AgentResult]) -> Vec<Finding> {
    let mut ordered: Vec<&AgentResult> = results.iter().filter(|r| r.success).collect();
    ordered.sort_by_key(|r| r.order);

    let mut seen = HashSet::new();
    let mut findings = Vec::new();
    for result in ordered {
        for sentence in split_sentences(&result.response_text(" ")) {
            let key = normalize(&sentence);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }
            findings.push(Finding {
                agent: result.agent.clone(),
                order: result.order,
                text: sentence,
            });
        }
    }
    findings
}
