//! Per-request decision trace
//!
//! A [`TraceRecorder`] is created for every routed request and threaded by
//! `&mut` through classification and delegation. It is never shared between
//! requests; the finished [`TraceSnapshot`] is embedded in the response
//! metadata so callers can see how the routing decision was reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const INITIAL_STEP: &str = "Analyzing user query and determining optimal approach...";
const FINAL_STEP: &str = "Analysis complete! Generating response...";

/// Status of a single trace step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Active,
    Completed,
    Error,
}

/// Overall status of the trace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Processing,
    Searching,
    Retrieving,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub id: usize,
    pub title: String,
    pub detail: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A knowledge source consulted while classifying
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub confidence: Option<f64>,
    pub results_count: Option<usize>,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInsights {
    pub patterns: Vec<String>,
    pub insights: Vec<String>,
    pub similar_queries: Vec<String>,
    pub confidence: Option<f64>,
}

/// Immutable copy of a trace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceSnapshot {
    pub id: String,
    pub agent_type: String,
    pub active: bool,
    pub status: TraceStatus,
    pub confidence: Option<f64>,
    pub steps: Vec<TraceStep>,
    pub sources: Vec<TraceSource>,
    pub memory: MemoryInsights,
    pub started_at: DateTime<Utc>,
    pub total_steps: usize,
}

/// Ordered record of routing decisions for one request
///
/// # Examples
/// ```
/// use a2a_orchestrator::observability::trace::{StepStatus, TraceRecorder};
///
/// let mut trace = TraceRecorder::new("orchestrator");
/// trace.add_step("Checking for explicit handler requests", StepStatus::Active);
/// trace.complete();
///
/// let snapshot = trace.snapshot();
/// assert!(!snapshot.active);
/// assert!(snapshot.steps.iter().all(|s| s.status != StepStatus::Active));
/// ```
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    id: String,
    agent_type: String,
    active: bool,
    status: TraceStatus,
    confidence: Option<f64>,
    steps: Vec<TraceStep>,
    sources: Vec<TraceSource>,
    memory: MemoryInsights,
    started_at: DateTime<Utc>,
}

impl TraceRecorder {
    /// Start a trace with its initial analysis step
    pub fn new(agent_type: impl Into<String>) -> Self {
        let started_at = Utc::now();
        let mut recorder = Self {
            id: format!("thinking-{}", started_at.timestamp_millis()),
            agent_type: agent_type.into(),
            active: true,
            status: TraceStatus::Processing,
            confidence: None,
            steps: Vec::new(),
            sources: Vec::new(),
            memory: MemoryInsights::default(),
            started_at,
        };
        recorder.add_step(INITIAL_STEP, StepStatus::Active);
        recorder
    }

    /// Append a step and return its id
    pub fn add_step(&mut self, detail: impl Into<String>, status: StepStatus) -> usize {
        self.add_step_with_metadata(detail, status, Map::new())
    }

    pub fn add_step_with_metadata(
        &mut self,
        detail: impl Into<String>,
        status: StepStatus,
        metadata: Map<String, Value>,
    ) -> usize {
        let id = self.steps.len();
        self.steps.push(TraceStep {
            id,
            title: format!("Step {}", id + 1),
            detail: detail.into(),
            status,
            timestamp: Utc::now(),
            metadata,
        });
        id
    }

    /// Replace the recorded knowledge sources
    pub fn add_sources(&mut self, sources: Vec<TraceSource>) {
        self.sources = sources;
    }

    pub fn add_memory_insights(&mut self, memory: MemoryInsights) {
        self.memory = memory;
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
    }

    pub fn set_status(&mut self, status: TraceStatus) {
        self.status = status;
    }

    /// Finish the trace
    ///
    /// Every still-active step becomes completed, a final step is appended
    /// and the trace is marked inactive. Later calls are no-ops.
    pub fn complete(&mut self) {
        if !self.active {
            return;
        }

        for step in &mut self.steps {
            if step.status == StepStatus::Active {
                step.status = StepStatus::Completed;
            }
        }
        self.add_step(FINAL_STEP, StepStatus::Completed);
        self.status = TraceStatus::Completed;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn snapshot(&self) -> TraceSnapshot {
        TraceSnapshot {
            id: self.id.clone(),
            agent_type: self.agent_type.clone(),
            active: self.active,
            status: self.status,
            confidence: self.confidence,
            steps: self.steps.clone(),
            sources: self.sources.clone(),
            memory: self.memory.clone(),
            started_at: self.started_at,
            total_steps: self.steps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_trace_has_initial_step() {
        let trace = TraceRecorder::new("orchestrator");

        assert!(trace.is_active());
        assert_eq!(trace.steps().len(), 1);
        assert_eq!(trace.steps()[0].detail, INITIAL_STEP);
        assert_eq!(trace.steps()[0].title, "Step 1");
    }

    #[test]
    fn test_step_ids_are_sequential() {
        let mut trace = TraceRecorder::new("orchestrator");
        let a = trace.add_step("a", StepStatus::Active);
        let b = trace.add_step("b", StepStatus::Error);

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(trace.steps()[2].title, "Step 3");
    }

    #[test]
    fn test_complete_flips_active_steps_only() {
        let mut trace = TraceRecorder::new("orchestrator");
        trace.add_step("working", StepStatus::Active);
        trace.add_step("failed", StepStatus::Error);
        trace.complete();

        let snapshot = trace.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.status, TraceStatus::Completed);
        assert_eq!(snapshot.steps[1].status, StepStatus::Completed);
        assert_eq!(snapshot.steps[2].status, StepStatus::Error);
        assert_eq!(snapshot.steps.last().unwrap().detail, FINAL_STEP);
        assert_eq!(snapshot.total_steps, 4);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut trace = TraceRecorder::new("orchestrator");
        trace.complete();
        trace.complete();

        assert_eq!(trace.steps().len(), 2);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut trace = TraceRecorder::new("orchestrator");
        trace.set_confidence(1.7);
        assert_eq!(trace.snapshot().confidence, Some(1.0));
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let mut trace = TraceRecorder::new("orchestrator");
        let mut metadata = Map::new();
        metadata.insert("agent".to_string(), json!("legal"));
        trace.add_step_with_metadata("Consulting legal", StepStatus::Active, metadata);
        trace.add_sources(vec![TraceSource {
            kind: "vector".to_string(),
            name: "Knowledge Base".to_string(),
            confidence: Some(0.8),
            results_count: Some(3),
            response_time_ms: None,
        }]);
        trace.set_status(TraceStatus::Searching);

        let value = serde_json::to_value(trace.snapshot()).unwrap();
        assert_eq!(value["status"], "searching");
        assert_eq!(value["totalSteps"], 2);
        assert_eq!(value["steps"][1]["metadata"]["agent"], "legal");
        assert!(value["steps"][0].get("metadata").is_none());
        assert_eq!(value["sources"][0]["type"], "vector");
        assert_eq!(value["sources"][0]["resultsCount"], 3);
        assert!(value["memory"]["similarQueries"].is_array());
    }
}
