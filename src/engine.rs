//! Execution Engine (Reactor Core): accepts atoms, validates, dispatches
//! to a handler under timeout, records statistics, and exposes
//! inter-packet call semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Digest as _;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::handler::HandlerStats;
use crate::domain::{Atom, AtomResult, ErrorRecord, PacketKey, ResponseMeta, Value};
use crate::domain::statistics::{self, NumericStats};
use crate::error::PacketFlowError;
use crate::registry::Registry;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Pure helpers exposed to handlers through the Execution Context:
/// case folding, hashing digests, base64, URL-escape, JSON parse/emit,
/// UUID generation, numeric statistics, and an object-filter matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utilities;

impl Utilities {
    /// Lowercase an ASCII-or-UTF8 string.
    #[must_use]
    pub fn to_lower(&self, s: &str) -> String {
        s.to_lowercase()
    }

    /// Uppercase an ASCII-or-UTF8 string.
    #[must_use]
    pub fn to_upper(&self, s: &str) -> String {
        s.to_uppercase()
    }

    /// Hex-encoded MD5 digest.
    #[must_use]
    pub fn md5_hex(&self, data: &[u8]) -> String {
        format!("{:x}", md5::Md5::digest(data))
    }

    /// Hex-encoded SHA-256 digest.
    #[must_use]
    pub fn sha256_hex(&self, data: &[u8]) -> String {
        format!("{:x}", sha2::Sha256::digest(data))
    }

    /// Standard base64 encode.
    #[must_use]
    pub fn base64_encode(&self, data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    /// Standard base64 decode.
    pub fn base64_decode(&self, data: &str) -> Result<Vec<u8>, PacketFlowError> {
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| PacketFlowError::Validation(format!("invalid base64: {e}")))
    }

    /// Percent-escape a string for use in a URL component.
    #[must_use]
    pub fn url_escape(&self, s: &str) -> String {
        utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
    }

    /// Percent-unescape a URL component.
    pub fn url_unescape(&self, s: &str) -> Result<String, PacketFlowError> {
        percent_decode_str(s)
            .decode_utf8()
            .map(|cow| cow.into_owned())
            .map_err(|e| PacketFlowError::Validation(format!("invalid percent-encoding: {e}")))
    }

    /// Parse a JSON string into a `Value`.
    pub fn json_parse(&self, s: &str) -> Result<Value, PacketFlowError> {
        serde_json::from_str::<serde_json::Value>(s)
            .map(Value::from)
            .map_err(|e| PacketFlowError::Validation(format!("invalid JSON: {e}")))
    }

    /// Serialize a `Value` to a JSON string.
    #[must_use]
    pub fn json_stringify(&self, value: &Value) -> String {
        serde_json::Value::from(value.clone()).to_string()
    }

    /// Generate a random v4 UUID string.
    #[must_use]
    pub fn uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Count/sum/mean/median/min/max/variance/stddev over `samples`.
    #[must_use]
    pub fn numeric_stats(&self, samples: &[f64]) -> NumericStats {
        statistics::compute(samples)
    }

    /// Evaluate an object-filter: `field -> {"$gt": v}`-style operators,
    /// or plain equality when the filter value is not an operator map.
    #[must_use]
    pub fn matches(&self, value: &Value, filter: &Value) -> bool {
        let Some(filter_map) = filter.as_map() else {
            return value == filter;
        };
        for (field, constraint) in filter_map {
            let Some(actual) = value.get(field) else {
                return false;
            };
            let matched = if let Some(ops) = constraint.as_map() {
                ops.iter().all(|(op, operand)| actual.compare(op, operand))
            } else {
                actual.compare("$eq", constraint)
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

/// Aggregate, engine-wide statistics updated with atomic arithmetic.
#[derive(Debug, Default)]
pub struct EngineStats {
    processed: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
}

impl EngineStats {
    fn record(&self, success: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total atoms dispatched.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Atoms that completed successfully.
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Atoms that failed for any reason.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Exposed to a running handler: the atom under dispatch, a way to call
/// other packets, pure utilities, and a logging hook. Deadlines are
/// absolute timestamps so inter-packet calls trivially honor the caller's
/// remaining budget rather than restarting the clock.
pub struct ExecutionContext {
    /// Identifier of the atom currently being dispatched.
    pub atom_identifier: String,
    /// Packet keys (as strings) of the call chain that led here, oldest
    /// first.
    pub caller_chain: Vec<String>,
    /// Absolute deadline for this dispatch and anything it calls.
    pub deadline: Instant,
    /// Identifier of the reactor running this dispatch.
    pub reactor_id: String,
    engine: Arc<ExecutionEngine>,
}

impl ExecutionContext {
    /// The pure helpers object.
    #[must_use]
    pub fn utilities(&self) -> Utilities {
        Utilities
    }

    /// Emit a structured log line keyed by the atom and reactor.
    pub fn log(&self, level: tracing::Level, message: &str) {
        match level {
            tracing::Level::ERROR => error!(atom = %self.atom_identifier, reactor = %self.reactor_id, "{message}"),
            tracing::Level::WARN => warn!(atom = %self.atom_identifier, reactor = %self.reactor_id, "{message}"),
            _ => debug!(atom = %self.atom_identifier, reactor = %self.reactor_id, "{message}"),
        }
    }

    /// Invoke another atom by key from inside a running handler,
    /// inheriting the remaining deadline. A handler may request a
    /// shorter deadline (via `requested_timeout_secs`) but never longer.
    pub async fn call(
        &self,
        group: &str,
        element: &str,
        variant: Option<String>,
        payload: Value,
        requested_timeout_secs: Option<u64>,
    ) -> Result<Value, PacketFlowError> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let bounded = match requested_timeout_secs {
            Some(secs) => remaining.min(Duration::from_secs(secs)),
            None => remaining,
        };

        let nonce = Uuid::new_v4();
        let mut atom = Atom::new(
            format!("{}.call.{}", self.atom_identifier, nonce),
            group,
            element,
            payload,
        );
        atom.variant = variant;
        atom.timeout_secs = Some(bounded.as_secs().max(1));

        let mut chain = self.caller_chain.clone();
        let this_key = atom
            .packet_key()
            .map(|k| k.to_string())
            .unwrap_or_default();
        chain.push(this_key);

        self.engine
            .dispatch_with_chain(atom, chain, Instant::now() + bounded)
            .await
            .outcome_into_result()
    }
}

trait OutcomeIntoResult {
    fn outcome_into_result(self) -> Result<Value, PacketFlowError>;
}

impl OutcomeIntoResult for AtomResult {
    fn outcome_into_result(self) -> Result<Value, PacketFlowError> {
        match self.outcome {
            crate::domain::atom::AtomOutcome::Success(value) => Ok(value),
            crate::domain::atom::AtomOutcome::Failure(err) => {
                Err(PacketFlowError::from_code(&err.code, err.message))
            }
        }
    }
}

/// Accepts atoms, resolves their handler, runs it under a deadline, and
/// records statistics. Owns the only mutable runtime statistics in the
/// crate (see the Ownership rule in the data model).
pub struct ExecutionEngine {
    registry: Arc<Registry>,
    reactor_id: String,
    config: EngineConfig,
    stats: EngineStats,
    concurrency: Semaphore,
}

impl ExecutionEngine {
    /// Construct an engine over `registry`, identifying itself as
    /// `reactor_id` in response metadata and logs.
    #[must_use]
    pub fn new(registry: Arc<Registry>, reactor_id: impl Into<String>, config: EngineConfig) -> Arc<Self> {
        let ceiling = config.concurrency_ceiling;
        Arc::new(ExecutionEngine {
            registry,
            reactor_id: reactor_id.into(),
            config,
            stats: EngineStats::default(),
            concurrency: Semaphore::new(ceiling),
        })
    }

    /// Engine-wide statistics.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// The registry this engine dispatches against.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// This reactor's identifier.
    #[must_use]
    pub fn reactor_id(&self) -> &str {
        &self.reactor_id
    }

    /// Atoms currently holding a concurrency permit, for introspection.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.config.concurrency_ceiling - self.concurrency.available_permits()
    }

    /// The configured per-reactor concurrency ceiling.
    #[must_use]
    pub fn concurrency_ceiling(&self) -> usize {
        self.config.concurrency_ceiling
    }

    /// Dispatch a top-level atom (no caller chain, fresh deadline).
    #[instrument(skip(self, atom), fields(atom_id = %atom.identifier))]
    pub async fn dispatch(self: &Arc<Self>, atom: Atom) -> AtomResult {
        let timeout_secs = atom
            .timeout_secs
            .unwrap_or(self.config.default_timeout_secs);
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        self.dispatch_with_chain(atom, Vec::new(), deadline).await
    }

    /// Dispatch an atom carrying an existing caller chain and a deadline
    /// already bounded by the caller (used by inter-packet calls).
    pub async fn dispatch_with_chain(
        self: &Arc<Self>,
        atom: Atom,
        caller_chain: Vec<String>,
        deadline: Instant,
    ) -> AtomResult {
        let start = Instant::now();
        let meta = |packet_key: String| ResponseMeta {
            duration_ms: start.elapsed().as_millis() as u64,
            reactor_id: self.reactor_id.clone(),
            timestamp_ms: now_ms(),
            packet_key,
        };

        // 1. Validate.
        if let Err(e) = atom.validate() {
            return AtomResult::failure(
                ErrorRecord::from_error(&PacketFlowError::Validation(e.to_string())),
                meta(format!("{}:{}", atom.group, atom.element)),
            );
        }

        // Depth check before resolving the handler, since a cycling call
        // chain should never reach dispatch again.
        if caller_chain.len() > self.config.max_call_depth {
            let err = PacketFlowError::CallDepthExceeded {
                max: self.config.max_call_depth,
            };
            return AtomResult::failure(ErrorRecord::from_error(&err), meta(atom.identifier.clone()));
        }

        // 2. Resolve handler.
        let key = match atom.packet_key() {
            Ok(key) => key,
            Err(e) => {
                return AtomResult::failure(
                    ErrorRecord::from_error(&PacketFlowError::Validation(e.to_string())),
                    meta(atom.identifier.clone()),
                )
            }
        };
        let Some(record) = self.registry.lookup(&key) else {
            let err = PacketFlowError::Unsupported(key.clone());
            return AtomResult::failure(ErrorRecord::from_error(&err), meta(key.to_string()));
        };

        // 3. Payload size check.
        let size = atom.payload.approx_size();
        let max = record.metadata().max_payload_size;
        if size > max {
            let err = PacketFlowError::PayloadTooLarge { actual: size, max };
            return AtomResult::failure(ErrorRecord::from_error(&err), meta(key.to_string()));
        }

        // 4. Effective timeout already folded into `deadline` by the
        // caller for inter-packet calls; for top-level dispatch it was
        // computed in `dispatch`.
        let _ = atom.timeout_secs; // already consumed into `deadline`

        // 5. Build context.
        let _permit = self.concurrency.acquire().await;
        let ctx = ExecutionContext {
            atom_identifier: atom.identifier.clone(),
            caller_chain,
            deadline,
            reactor_id: self.reactor_id.clone(),
            engine: Arc::clone(self),
        };

        // 6. Invoke under deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let handler = Arc::clone(record.handler());
        let payload = atom.payload.clone();
        let outcome = tokio::time::timeout(remaining, handler.invoke(&payload, &ctx)).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let timestamp_ms = now_ms();
        let (result, failed) = match outcome {
            Ok(Ok(value)) => (AtomOutcomeResult::Success(value), false),
            Ok(Err(e)) => (AtomOutcomeResult::Failure(ErrorRecord::from_error(&e)), true),
            Err(_elapsed) => {
                let err = PacketFlowError::Timeout(format!("handler for {key} exceeded its deadline"));
                (AtomOutcomeResult::Failure(ErrorRecord::from_error(&err)), true)
            }
        };

        // 7. Update statistics.
        record.stats().record(duration_ms, timestamp_ms, failed);
        self.stats.record(!failed);

        let response_meta = ResponseMeta {
            duration_ms,
            reactor_id: self.reactor_id.clone(),
            timestamp_ms,
            packet_key: key.to_string(),
        };

        // 8. Build the Atom Result.
        match result {
            AtomOutcomeResult::Success(value) => AtomResult::success(value, response_meta),
            AtomOutcomeResult::Failure(err) => AtomResult::failure(err, response_meta),
        }
    }
}

enum AtomOutcomeResult {
    Success(Value),
    Failure(ErrorRecord),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handler::{Handler, HandlerMetadata};
    use async_trait::async_trait;

    struct Uppercase;

    #[async_trait]
    impl Handler for Uppercase {
        async fn invoke(&self, payload: &Value, ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
            let input = payload.get("input").and_then(Value::as_str).unwrap_or_default();
            Ok(Value::Map(std::collections::BTreeMap::from([(
                "result".to_string(),
                Value::Str(ctx.utilities().to_upper(input)),
            )])))
        }

        fn describe(&self) -> HandlerMetadata {
            HandlerMetadata::new("uppercases input")
        }
    }

    struct SlowEcho;

    #[async_trait]
    impl Handler for SlowEcho {
        async fn invoke(&self, payload: &Value, _ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(payload.clone())
        }

        fn describe(&self) -> HandlerMetadata {
            let mut meta = HandlerMetadata::new("sleeps 2s");
            meta.timeout_secs = 30;
            meta
        }
    }

    fn test_engine() -> Arc<ExecutionEngine> {
        let registry = Arc::new(Registry::new());
        registry
            .register(PacketKey::new("df", "transform", None).unwrap(), Arc::new(Uppercase), false)
            .unwrap();
        registry
            .register(PacketKey::new("cf", "slow", None).unwrap(), Arc::new(SlowEcho), false)
            .unwrap();
        ExecutionEngine::new(registry, "test-reactor", EngineConfig::default())
    }

    #[tokio::test]
    async fn unsupported_key_returns_e404() {
        let engine = test_engine();
        let atom = Atom::new("a1", "cf", "missing", Value::empty_map());
        let result = engine.dispatch(atom).await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn successful_dispatch_uppercases_input() {
        let engine = test_engine();
        let payload = Value::Map(std::collections::BTreeMap::from([(
            "input".to_string(),
            Value::Str("hello world".to_string()),
        )]));
        let atom = Atom::new("t1", "df", "transform", payload);
        let result = engine.dispatch(atom).await;
        assert!(result.is_success());
        match result.outcome {
            crate::domain::atom::AtomOutcome::Success(value) => {
                assert_eq!(value.get("result").and_then(Value::as_str), Some("HELLO WORLD"));
            }
            crate::domain::atom::AtomOutcome::Failure(_) => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn timeout_produces_e408() {
        let engine = test_engine();
        let mut atom = Atom::new("ag1", "cf", "slow", Value::empty_map());
        atom.timeout_secs = Some(1);
        let start = Instant::now();
        let result = engine.dispatch(atom).await;
        assert!(!result.is_success());
        if let crate::domain::atom::AtomOutcome::Failure(err) = result.outcome {
            assert_eq!(err.code, "E408");
            assert!(!err.permanent);
        } else {
            panic!("expected failure");
        }
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn utilities_round_trip_base64_and_json() {
        let utils = Utilities;
        let encoded = utils.base64_encode(b"hello");
        assert_eq!(utils.base64_decode(&encoded).unwrap(), b"hello");

        let value = utils.json_parse(r#"{"a":1}"#).unwrap();
        assert_eq!(value.get("a").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn matches_supports_comparison_operators() {
        let utils = Utilities;
        let value = Value::Map(std::collections::BTreeMap::from([(
            "sales".to_string(),
            Value::Int(150),
        )]));
        let filter = Value::Map(std::collections::BTreeMap::from([(
            "sales".to_string(),
            Value::Map(std::collections::BTreeMap::from([(
                "$gt".to_string(),
                Value::Int(100),
            )])),
        )]));
        assert!(utils.matches(&value, &filter));
    }
}
