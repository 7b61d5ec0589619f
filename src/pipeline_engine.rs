//! Pipeline Engine: executes a Pipeline Definition as a linear sequence
//! of atoms, threading each step's result into the next step's payload.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::domain::atom::{AtomOutcome, ErrorRecord};
use crate::domain::pipeline::{PipelineDefinition, PipelineExecution, StepTrace};
use crate::domain::{Atom, Value};
use crate::engine::ExecutionEngine;
use crate::error::PacketFlowError;
use crate::router::Router;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The terminal outcome of a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Every step succeeded; carries the final step's result.
    Success(Value),
    /// A step failed, or the overall timeout expired; carries the
    /// partial trace and the triggering error.
    Failure {
        /// Steps that completed before the failure.
        completed_steps: usize,
        /// Trace entries recorded so far, including the failing step.
        trace: Vec<StepTrace>,
        /// Total wall-clock elapsed at the point of failure.
        elapsed_ms: u64,
        /// The error that ended the run.
        error: ErrorRecord,
    },
}

/// Executes Pipeline Definitions. Does not own in-flight Pipeline
/// Executions beyond the lifetime of a single `run` call; callers that
/// need to track many concurrent runs keep their own map of execution
/// identifier to outcome.
pub struct PipelineEngine {
    router: Arc<Router>,
    engine: Arc<ExecutionEngine>,
}

impl PipelineEngine {
    /// Build a pipeline engine over a router (used for its `route` call,
    /// to surface `NO_REACTOR_AVAILABLE`) and the local execution engine
    /// atoms are ultimately dispatched to.
    #[must_use]
    pub fn new(router: Arc<Router>, engine: Arc<ExecutionEngine>) -> Self {
        PipelineEngine { router, engine }
    }

    /// Run `definition` with `initial_input` as the first step's `input`
    /// field.
    pub async fn run(&self, definition: &PipelineDefinition, initial_input: Value) -> PipelineOutcome {
        let execution_id = Uuid::new_v4().to_string();
        let mut execution = PipelineExecution::new(execution_id.clone(), definition.pipeline_id.clone(), now_ms());

        let overall_deadline = Instant::now() + std::time::Duration::from_secs(definition.timeout_secs);
        let mut current_input = initial_input;
        let run_start = Instant::now();

        for (index, step) in definition.steps.iter().enumerate() {
            execution.current_step = index;

            if Instant::now() >= overall_deadline {
                let error = ErrorRecord::from_error(&PacketFlowError::Timeout(format!(
                    "pipeline {} exceeded its overall timeout",
                    definition.pipeline_id
                )));
                return PipelineOutcome::Failure {
                    completed_steps: index,
                    trace: execution.trace,
                    elapsed_ms: run_start.elapsed().as_millis() as u64,
                    error,
                };
            }

            let mut payload = match step.template.as_map() {
                Some(map) => map.clone(),
                None => BTreeMap::new(),
            };
            payload.insert("input".to_string(), current_input.clone());

            let identifier = format!(
                "{}.step{}.{}",
                definition.pipeline_id, index, execution_id
            );
            let mut atom = Atom::new(identifier, step.group.clone(), step.element.clone(), Value::Map(payload));
            atom.variant = step.variant.clone();
            atom.timeout_secs = step.timeout_secs;

            if let Err(err) = self.router.route(&atom) {
                let error = ErrorRecord::from_error(&err);
                execution.trace.push(StepTrace {
                    step_index: index,
                    packet_key: atom.packet_key().map(|k| k.to_string()).unwrap_or_default(),
                    duration_ms: 0,
                    success: false,
                    error: Some(error.clone()),
                });
                return PipelineOutcome::Failure {
                    completed_steps: index,
                    trace: execution.trace,
                    elapsed_ms: run_start.elapsed().as_millis() as u64,
                    error,
                };
            }

            let step_start = Instant::now();
            let remaining = overall_deadline.saturating_duration_since(Instant::now());
            let step_deadline = match atom.timeout_secs {
                Some(secs) => remaining.min(std::time::Duration::from_secs(secs)),
                None => remaining,
            };

            let result = tokio::time::timeout(step_deadline, self.engine.dispatch(atom.clone())).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;
            let key = atom.packet_key().map(|k| k.to_string()).unwrap_or_default();

            match result {
                Ok(atom_result) => match atom_result.outcome {
                    AtomOutcome::Success(value) => {
                        execution.trace.push(StepTrace {
                            step_index: index,
                            packet_key: key,
                            duration_ms,
                            success: true,
                            error: None,
                        });
                        current_input = value;
                    }
                    AtomOutcome::Failure(error) => {
                        execution.trace.push(StepTrace {
                            step_index: index,
                            packet_key: key,
                            duration_ms,
                            success: false,
                            error: Some(error.clone()),
                        });
                        return PipelineOutcome::Failure {
                            completed_steps: index,
                            trace: execution.trace,
                            elapsed_ms: run_start.elapsed().as_millis() as u64,
                            error,
                        };
                    }
                },
                Err(_elapsed) => {
                    let error = ErrorRecord::from_error(&PacketFlowError::Timeout(format!(
                        "pipeline {} step {} exceeded its timeout",
                        definition.pipeline_id, index
                    )));
                    execution.trace.push(StepTrace {
                        step_index: index,
                        packet_key: key,
                        duration_ms,
                        success: false,
                        error: Some(error.clone()),
                    });
                    return PipelineOutcome::Failure {
                        completed_steps: index,
                        trace: execution.trace,
                        elapsed_ms: run_start.elapsed().as_millis() as u64,
                        error,
                    };
                }
            }
        }

        PipelineOutcome::Success(current_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, RouterConfig};
    use crate::domain::affinity::Specialization;
    use crate::domain::handler::{Handler, HandlerMetadata};
    use crate::domain::pipeline::PipelineStep;
    use crate::domain::ReactorDescriptor;
    use crate::error::PacketFlowError;
    use crate::registry::Registry;
    use async_trait::async_trait;

    struct Lowercase;

    #[async_trait]
    impl Handler for Lowercase {
        async fn invoke(
            &self,
            payload: &Value,
            ctx: &crate::engine::ExecutionContext,
        ) -> Result<Value, PacketFlowError> {
            let input = payload.get("input").and_then(Value::as_str).unwrap_or_default();
            Ok(Value::Str(ctx.utilities().to_lower(input)))
        }

        fn describe(&self) -> HandlerMetadata {
            HandlerMetadata::new("lowercases input")
        }
    }

    struct Always(Value);

    #[async_trait]
    impl Handler for Always {
        async fn invoke(&self, _payload: &Value, _ctx: &crate::engine::ExecutionContext) -> Result<Value, PacketFlowError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> HandlerMetadata {
            HandlerMetadata::new("always returns a fixed value")
        }
    }

    fn setup() -> PipelineEngine {
        let registry = Arc::new(Registry::new());
        registry
            .register(
                crate::domain::PacketKey::new("df", "transform", None).unwrap(),
                Arc::new(Lowercase),
                false,
            )
            .unwrap();
        registry
            .register(
                crate::domain::PacketKey::new("ed", "signal", None).unwrap(),
                Arc::new(Always(Value::Str("signaled".to_string()))),
                false,
            )
            .unwrap();

        let engine = ExecutionEngine::new(registry, "reactor-1", EngineConfig::default());
        let router = Arc::new(Router::new(RouterConfig::default()));
        router.add(ReactorDescriptor::new(
            "reactor-1",
            "127.0.0.1:9000",
            vec![Specialization::General],
            100,
        ));
        PipelineEngine::new(router, engine)
    }

    #[tokio::test]
    async fn two_step_pipeline_threads_result_as_input() {
        let engine = setup();
        let definition = PipelineDefinition::new(
            "p1",
            vec![
                PipelineStep::new("df", "transform"),
                PipelineStep::new("ed", "signal"),
            ],
        );

        let outcome = engine.run(&definition, Value::Str("HELLO".to_string())).await;
        match outcome {
            PipelineOutcome::Success(value) => assert_eq!(value, Value::Str("signaled".to_string())),
            PipelineOutcome::Failure { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn missing_handler_short_circuits_with_partial_trace() {
        let engine = setup();
        let definition = PipelineDefinition::new(
            "p1",
            vec![
                PipelineStep::new("df", "transform"),
                PipelineStep::new("df", "missing"),
            ],
        );

        let outcome = engine.run(&definition, Value::Str("HELLO".to_string())).await;
        match outcome {
            PipelineOutcome::Failure {
                completed_steps,
                trace,
                ..
            } => {
                assert_eq!(completed_steps, 1);
                assert_eq!(trace.len(), 2);
                assert!(trace[0].success);
                assert!(!trace[1].success);
            }
            PipelineOutcome::Success(_) => panic!("expected failure"),
        }
    }
}
