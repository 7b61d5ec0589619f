//! # packetflow
//!
//! An affinity-routed distributed compute runtime. Reactors register
//! handlers for packet keys (`group:element[:variant]`), a router scores
//! candidate reactors by affinity, load, priority, and health, and a
//! binary wire protocol carries submissions, results, and control
//! messages between clients and reactors. A linear pipeline engine
//! chains steps together, threading each step's output into the next.
//!
//! ## Components
//!
//! - [`domain`] — validated primitives: packet keys, atoms, reactor
//!   descriptors, affinity tables, pipeline definitions, wire messages.
//! - [`registry`] — the in-memory map from packet key to Handler Record.
//! - [`engine`] — dispatches atoms to local handlers under a concurrency
//!   ceiling.
//! - [`router`] — scores and selects reactors for inter-reactor routing.
//! - [`health`] — tracks reactor liveness via periodic probes.
//! - [`codec`] — encodes and decodes the binary wire frame.
//! - [`gateway`] — per-connection session state machine over the wire
//!   protocol.
//! - [`pipeline_engine`] — runs linear pipeline definitions end to end.
//! - [`rest_api`] — `/health`, `/info`, `/stats` introspection endpoints.
//! - [`config`] — environment-driven configuration.
//! - [`observability`] — process-wide `tracing` initialization.
//! - [`error`] — the shared error taxonomy.

pub mod codec;
pub mod config;
pub mod demo_handlers;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod health;
pub mod observability;
pub mod pipeline_engine;
pub mod registry;
pub mod rest_api;
pub mod router;
pub mod server;
pub mod time_provider;

pub use config::{EngineConfig, GatewayConfig, HealthTrackerConfig, PacketFlowConfig, RouterConfig};
pub use domain::{
    AffinityTable, Atom, AtomResult, ErrorRecord, HandlerMetadata, HandlerRecord, HandlerStats,
    MessageType, PacketKey, PipelineDefinition, PipelineExecution, PipelineStep, ReactorDescriptor,
    ResponseMeta, Specialization, StepTrace, Value, WireMessage,
};
pub use engine::{ExecutionContext, ExecutionEngine};
pub use error::PacketFlowError;
pub use gateway::GatewaySession;
pub use health::HealthTracker;
pub use pipeline_engine::PipelineEngine;
pub use registry::Registry;
pub use router::Router;
