//! Handler Record owned by the Registry, and the `Handler` trait itself.
//!
//! Handlers are modeled as objects rather than duck-typed closures: a
//! `Handler` exposes `invoke` and `describe`, and tagged configuration
//! (built by whatever registers it, including an external generator)
//! decides which concrete type backs a given packet key.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Value;
use crate::engine::ExecutionContext;
use crate::error::PacketFlowError;

/// Static metadata describing a handler, supplied at registration and
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerMetadata {
    /// Default timeout in seconds, used when an atom omits a per-call
    /// timeout.
    pub timeout_secs: u64,
    /// Maximum accepted payload size, in bytes.
    pub max_payload_size: usize,
    /// 1 (least trusted) to 3 (most trusted).
    pub compliance_level: u8,
    /// Packet keys this handler may call internally.
    pub dependencies: Vec<String>,
    /// Capability tags this handler requires.
    pub permissions: Vec<String>,
    /// Human-readable description.
    pub description: String,
    /// Who or what registered this handler.
    pub creator: String,
    /// Epoch milliseconds of registration.
    pub created_at_ms: u64,
    /// Semantic version string.
    pub version: String,
}

impl HandlerMetadata {
    /// A metadata record with sensible defaults for a hand-written
    /// handler: 30s timeout, 1MiB payload cap, compliance level 1.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        HandlerMetadata {
            timeout_secs: 30,
            max_payload_size: 1024 * 1024,
            compliance_level: 1,
            dependencies: Vec::new(),
            permissions: Vec::new(),
            description: description.into(),
            creator: "unknown".to_string(),
            created_at_ms: 0,
            version: "0.1.0".to_string(),
        }
    }
}

/// Mutable, atomically-updated call statistics for a single handler.
#[derive(Debug, Default)]
pub struct HandlerStats {
    call_count: AtomicU64,
    cumulative_duration_ms: AtomicU64,
    error_count: AtomicU64,
    last_called_ms: AtomicU64,
}

impl HandlerStats {
    /// Record the completion of one dispatch.
    pub fn record(&self, duration_ms: u64, timestamp_ms: u64, failed: bool) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.cumulative_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        if failed {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.last_called_ms.store(timestamp_ms, Ordering::Relaxed);
    }

    /// Total calls observed.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sum of all dispatch durations, in milliseconds.
    #[must_use]
    pub fn cumulative_duration_ms(&self) -> u64 {
        self.cumulative_duration_ms.load(Ordering::Relaxed)
    }

    /// Total failed calls observed.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Epoch milliseconds of the most recent call, 0 if never called.
    #[must_use]
    pub fn last_called_ms(&self) -> u64 {
        self.last_called_ms.load(Ordering::Relaxed)
    }

    /// Mean call duration in milliseconds, 0.0 if never called.
    #[must_use]
    pub fn average_duration_ms(&self) -> f64 {
        let calls = self.call_count();
        if calls == 0 {
            0.0
        } else {
            self.cumulative_duration_ms() as f64 / calls as f64
        }
    }
}

/// A handler's `invoke`/`describe` contract (see `spec.md` §9, Handler
/// polymorphism).
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one atom's payload under the engine-constructed context.
    async fn invoke(&self, payload: &Value, ctx: &ExecutionContext) -> Result<Value, PacketFlowError>;

    /// Static metadata to register this handler under.
    fn describe(&self) -> HandlerMetadata;
}

/// Owned by the Registry: a handler plus its metadata and live statistics.
pub struct HandlerRecord {
    handler: std::sync::Arc<dyn Handler>,
    metadata: HandlerMetadata,
    stats: HandlerStats,
}

impl HandlerRecord {
    /// Wrap a handler with its metadata, zeroed statistics.
    #[must_use]
    pub fn new(handler: std::sync::Arc<dyn Handler>) -> Self {
        let metadata = handler.describe();
        HandlerRecord {
            handler,
            metadata,
            stats: HandlerStats::default(),
        }
    }

    /// The underlying handler.
    #[must_use]
    pub fn handler(&self) -> &std::sync::Arc<dyn Handler> {
        &self.handler
    }

    /// This handler's static metadata.
    #[must_use]
    pub fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }

    /// This handler's live call statistics.
    #[must_use]
    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }
}
