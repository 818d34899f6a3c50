//! Response aggregation
//!
//! Turns the consultation results into the single answer returned to the
//! caller and decides whether the request needs human follow-up.

pub mod findings;

use crate::config::EscalationSection;
use crate::delegation::AgentResult;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::protocol::TaskState;
use crate::registry::HandlerRegistry;
use findings::{collect_findings, leading_clause, normalize, Finding};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

const EMPTY_RESPONSE: &str = "Analysis completed successfully.";
const SUMMARY_HEADER: &str =
    "## Analysis Summary\n\nOur specialist agents have analyzed your request sequentially:\n\n";
const ESCALATION_HEADER: &str = "## Escalation Required\n\nI need to escalate this request to a human agent for the best assistance. However, here's what our specialist agents were able to analyze:\n\n";
const NO_ANALYSIS: &str = "No specialist analysis was available for this request.";
const SECTION_DIVIDER: &str = "\n\n---\n\n";
const UNAVAILABLE_NOTE: &str =
    "\n\n> **Note:** Some specialist agents were unavailable during the consultation chain.";
const CONCLUSION_HEADER: &str =
    "\n\n## Final Conclusion\n\nKey actionable takeaways from all specialist agents:";

/// Final answer and outcome statistics for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub text: String,
    pub state: TaskState,
    pub escalate: bool,
    pub success_rate: f64,
    pub successful: usize,
    pub failed: usize,
    /// Answer is one handler's response, passed through verbatim
    pub single_handler: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseAggregator {
    confidence_threshold: f64,
    success_rate_threshold: f64,
}

impl Default for ResponseAggregator {
    fn default() -> Self {
        Self::new(&EscalationSection::default())
    }
}

impl ResponseAggregator {
    pub fn new(settings: &EscalationSection) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            success_rate_threshold: settings.success_rate_threshold,
        }
    }

    pub fn should_escalate(&self, confidence: f64, success_rate: f64) -> bool {
        confidence < self.confidence_threshold || success_rate < self.success_rate_threshold
    }

    /// Merge consultation results into one response
    ///
    /// `targeted` is the number of handlers the classifier selected, before
    /// any delegation. One target with one success passes its answer through
    /// verbatim, even when a delegated handler failed.
    ///
    /// # Errors
    ///
    /// Fails only when the results break their own invariants: a handler
    /// listed twice, or a success without a response.
    pub fn aggregate(
        &self,
        results: &[AgentResult],
        targeted: usize,
        confidence: f64,
        registry: &HandlerRegistry,
    ) -> OrchestratorResult<Aggregation> {
        check_results(results)?;

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let success_rate = if results.is_empty() {
            0.0
        } else {
            successful as f64 / results.len() as f64
        };
        let escalate = self.should_escalate(confidence, success_rate);
        debug!(successful, failed, success_rate, escalate, "Aggregating results");

        let single_path = targeted == 1 && successful == 1 && !escalate;
        let single = results.iter().find(|r| single_path && r.success);
        let single_handler = single.is_some();
        let text = match single {
            Some(result) => single_response(result),
            None => render_combined(results, escalate, failed > 0, registry),
        };

        Ok(Aggregation {
            text,
            state: if escalate {
                TaskState::InputRequired
            } else {
                TaskState::Completed
            },
            escalate,
            success_rate,
            successful,
            failed,
            single_handler,
        })
    }
}

fn check_results(results: &[AgentResult]) -> OrchestratorResult<()> {
    let mut seen = HashSet::new();
    for result in results {
        if !seen.insert(result.agent.as_str()) {
            return Err(OrchestratorError::internal(format!(
                "handler {} was consulted more than once",
                result.agent
            )));
        }
        if result.success && result.response.is_none() {
            return Err(OrchestratorError::internal(format!(
                "handler {} succeeded without a response",
                result.agent
            )));
        }
    }
    Ok(())
}

fn single_response(result: &AgentResult) -> String {
    let text = result.response_text("\n");
    if text.is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        text
    }
}

fn render_combined(
    results: &[AgentResult],
    escalate: bool,
    any_failed: bool,
    registry: &HandlerRegistry,
) -> String {
    let mut text = String::from(if escalate {
        ESCALATION_HEADER
    } else {
        SUMMARY_HEADER
    });

    let findings = collect_findings(results);
    let sections = render_sections(results, &findings, registry);
    if sections.is_empty() {
        text.push_str(if escalate { NO_ANALYSIS } else { EMPTY_RESPONSE });
    } else {
        text.push_str(&sections.join(SECTION_DIVIDER));
    }

    if any_failed && !escalate {
        text.push_str(UNAVAILABLE_NOTE);
    }

    if findings.len() >= 2 {
        if let Some(conclusion) = render_conclusion(&findings, registry) {
            text.push_str(&conclusion);
        }
    }

    text
}

/// One section per successful handler, in consultation order
fn render_sections(
    results: &[AgentResult],
    findings: &[Finding],
    registry: &HandlerRegistry,
) -> Vec<String> {
    let mut ordered: Vec<&AgentResult> = results.iter().filter(|r| r.success).collect();
    ordered.sort_by_key(|r| r.order);

    let mut sections = Vec::new();
    for result in ordered {
        let body = if result.response_text(" ").trim().is_empty() {
            EMPTY_RESPONSE.to_string()
        } else {
            let own: Vec<&str> = findings
                .iter()
                .filter(|f| f.agent == result.agent)
                .map(|f| f.text.as_str())
                .collect();
            if own.is_empty() {
                continue;
            }
            own.join("\n")
        };

        sections.push(format!(
            "### Step {}: {}\n{}",
            sections.len() + 1,
            registry.display_name(&result.agent).to_uppercase(),
            body
        ));
    }
    sections
}

/// Numbered takeaways, or `None` when every clause would repeat a finding
fn render_conclusion(findings: &[Finding], registry: &HandlerRegistry) -> Option<String> {
    let finding_keys: HashSet<String> = findings.iter().map(|f| normalize(&f.text)).collect();
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for finding in findings {
        let clause = leading_clause(&finding.text);
        let key = normalize(clause);
        // A clause equal to a whole finding is already in the body
        if key.is_empty() || finding_keys.contains(&key) || !seen.insert(key) {
            continue;
        }
        lines.push(format!(
            "{}. **{}**: {clause}.",
            lines.len() + 1,
            registry.display_name(&finding.agent)
        ));
    }

    if lines.is_empty() {
        None
    } else {
        Some(format!("{CONCLUSION_HEADER}\n{}", lines.join("\n")))
    }
}
