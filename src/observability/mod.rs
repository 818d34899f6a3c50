//! Observability: structured logging, process metrics and per-request traces

pub mod logging;
pub mod metrics;
pub mod trace;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};
pub use trace::{StepStatus, TraceRecorder, TraceSnapshot, TraceStatus};

pub use logging::{classification_span, handler_span, request_span};
