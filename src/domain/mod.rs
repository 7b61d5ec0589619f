//! Domain types for the PacketFlow runtime.
//!
//! Follows a "make illegal states unrepresentable" discipline: validated
//! primitives via `nutype`, explicit enums for state machines, and plain
//! structs for records owned by a single component.

pub mod affinity;
pub mod atom;
pub mod handler;
pub mod pipeline;
pub mod reactor;
pub mod statistics;
pub mod value;
pub mod wire;

pub use affinity::{AffinityTable, Specialization};
pub use atom::{Atom, AtomResult, ErrorRecord, PacketKey, ResponseMeta};
pub use handler::{HandlerMetadata, HandlerRecord, HandlerStats};
pub use pipeline::{PipelineDefinition, PipelineExecution, PipelineStep, StepTrace};
pub use reactor::ReactorDescriptor;
pub use value::Value;
pub use wire::{MessageType, WireMessage};
