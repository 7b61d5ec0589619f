//! Pipeline Definition and the in-flight Pipeline Execution record,
//! exclusively owned by the Pipeline Engine.

use serde::{Deserialize, Serialize};

use super::atom::ErrorRecord;
use super::Value;

/// One step of a Pipeline Definition: the packet key fragments plus a
/// partial payload template merged with `{input: previous_result}` at
/// run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Two-letter group.
    pub group: String,
    /// Element name within the group.
    pub element: String,
    /// Optional variant.
    pub variant: Option<String>,
    /// Partial payload merged with the previous step's result.
    pub template: Value,
    /// Per-step timeout override, in seconds.
    pub timeout_secs: Option<u64>,
}

impl PipelineStep {
    /// Build a step with no template fields and no per-step timeout
    /// override.
    #[must_use]
    pub fn new(group: impl Into<String>, element: impl Into<String>) -> Self {
        PipelineStep {
            group: group.into(),
            element: element.into(),
            variant: None,
            template: Value::empty_map(),
            timeout_secs: None,
        }
    }
}

/// An ordered sequence of steps, run by the Pipeline Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Unique identifier for this pipeline.
    pub pipeline_id: String,
    /// Ordered steps.
    pub steps: Vec<PipelineStep>,
    /// Overall wall-clock budget across all steps, in seconds.
    pub timeout_secs: u64,
}

impl PipelineDefinition {
    /// Build a definition with the default overall timeout (30s).
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        PipelineDefinition {
            pipeline_id: pipeline_id.into(),
            steps,
            timeout_secs: 30,
        }
    }
}

/// A single step's outcome within a Pipeline Execution's trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    /// Index of this step within the definition.
    pub step_index: usize,
    /// Packet key dispatched for this step.
    pub packet_key: String,
    /// Step duration, in milliseconds.
    pub duration_ms: u64,
    /// Whether the step succeeded.
    pub success: bool,
    /// Present only when `success` is false.
    pub error: Option<ErrorRecord>,
}

/// Per-run record owned exclusively by the Pipeline Engine while the run
/// is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// Unique identifier for this run.
    pub execution_id: String,
    /// The pipeline being executed.
    pub pipeline_id: String,
    /// Epoch milliseconds when the run started.
    pub started_at_ms: u64,
    /// Index of the step currently (or most recently) running.
    pub current_step: usize,
    /// Completed steps' trace entries, in order.
    pub trace: Vec<StepTrace>,
}

impl PipelineExecution {
    /// Start a fresh, empty execution record.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, pipeline_id: impl Into<String>, started_at_ms: u64) -> Self {
        PipelineExecution {
            execution_id: execution_id.into(),
            pipeline_id: pipeline_id.into(),
            started_at_ms,
            current_step: 0,
            trace: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_defaults_to_30s_timeout() {
        let def = PipelineDefinition::new("p1", vec![PipelineStep::new("df", "validate")]);
        assert_eq!(def.timeout_secs, 30);
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn execution_starts_empty() {
        let exec = PipelineExecution::new("e1", "p1", 1000);
        assert_eq!(exec.current_step, 0);
        assert!(exec.trace.is_empty());
    }
}
