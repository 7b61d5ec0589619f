//! A small handler library registered on every live reactor and
//! exercised by `packetflow-cli demo`, matching the end-to-end
//! scenarios literally: `cf:ping` echo/latency, `df:transform`
//! case-folding, `df:validate` schema checks, `df:aggregate` summation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::domain::handler::Handler;
use crate::domain::{HandlerMetadata, PacketKey, Value};
use crate::engine::ExecutionContext;
use crate::error::PacketFlowError;
use crate::registry::Registry;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Pulls a text value out of `payload`'s `input` field, unwrapping one
/// level of nesting when a prior pipeline step's result map carries the
/// text forward under its own `input`/`result`/`data` key.
fn input_text(payload: &Value) -> Option<&str> {
    match payload.get("input") {
        Some(Value::Str(s)) => Some(s.as_str()),
        Some(inner @ Value::Map(_)) => inner
            .get("input")
            .or_else(|| inner.get("result"))
            .or_else(|| inner.get("data"))
            .and_then(Value::as_str),
        _ => None,
    }
}

struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn invoke(&self, payload: &Value, _ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
        let echo = payload.get("echo").cloned().unwrap_or(Value::Null);
        let timestamp = payload.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let server_time = now_ms();

        let mut result = BTreeMap::new();
        result.insert("echo".to_string(), echo);
        result.insert("server_time".to_string(), Value::Int(server_time));
        result.insert("latency_ms".to_string(), Value::Int(server_time - timestamp));
        Ok(Value::Map(result))
    }

    fn describe(&self) -> HandlerMetadata {
        HandlerMetadata::new("echoes 'echo' and reports round-trip latency against 'timestamp'")
    }
}

struct Transform;

#[async_trait]
impl Handler for Transform {
    async fn invoke(&self, payload: &Value, ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
        let input = input_text(payload).ok_or_else(|| PacketFlowError::Validation("missing field 'input'".to_string()))?;
        let operation = payload.get("operation").and_then(Value::as_str).unwrap_or("uppercase");

        let utilities = ctx.utilities();
        let transformed = match operation {
            "uppercase" => utilities.to_upper(input),
            "lowercase" => utilities.to_lower(input),
            other => return Err(PacketFlowError::Validation(format!("unknown operation '{other}'"))),
        };

        let mut result = BTreeMap::new();
        result.insert("result".to_string(), Value::Str(transformed.clone()));
        result.insert("input".to_string(), Value::Str(transformed));
        Ok(Value::Map(result))
    }

    fn describe(&self) -> HandlerMetadata {
        HandlerMetadata::new("applies 'operation' (uppercase|lowercase) to 'input'")
    }
}

struct Validate;

#[async_trait]
impl Handler for Validate {
    async fn invoke(&self, payload: &Value, _ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
        let data = payload
            .get("data")
            .or_else(|| payload.get("input"))
            .and_then(Value::as_str)
            .ok_or_else(|| PacketFlowError::Validation("missing field 'data'".to_string()))?;
        let schema = payload.get("schema").and_then(Value::as_str).unwrap_or("email");

        let (valid, errors) = match schema {
            "email" => {
                let valid = data.split_once('@').is_some_and(|(user, domain)| {
                    !user.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
                });
                let errors = if valid {
                    Vec::new()
                } else {
                    vec![Value::Str(format!("'{data}' is not a valid email address"))]
                };
                (valid, errors)
            }
            other => return Err(PacketFlowError::Validation(format!("unknown schema '{other}'"))),
        };

        let mut result = BTreeMap::new();
        result.insert("valid".to_string(), Value::Bool(valid));
        result.insert("errors".to_string(), Value::Seq(errors));
        result.insert("input".to_string(), Value::Str(data.to_string()));
        Ok(Value::Map(result))
    }

    fn describe(&self) -> HandlerMetadata {
        HandlerMetadata::new("validates 'data' against the named 'schema' (only 'email' is implemented)")
    }
}

struct Aggregate;

#[async_trait]
impl Handler for Aggregate {
    async fn invoke(&self, payload: &Value, ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
        let rows = payload
            .get("input")
            .and_then(Value::as_seq)
            .ok_or_else(|| PacketFlowError::Validation("missing field 'input'".to_string()))?;
        let operations = payload
            .get("operations")
            .and_then(Value::as_map)
            .ok_or_else(|| PacketFlowError::Validation("missing field 'operations'".to_string()))?;

        let mut aggregated = BTreeMap::new();
        for (field, op) in operations {
            let op = op.as_str().unwrap_or("sum");
            let samples: Vec<f64> = rows.iter().filter_map(|row| row.get(field)).filter_map(Value::as_f64).collect();
            let stats = ctx.utilities().numeric_stats(&samples);
            let value = match op {
                "sum" => stats.sum,
                "mean" => stats.mean,
                "min" => stats.min,
                "max" => stats.max,
                other => return Err(PacketFlowError::Validation(format!("unknown aggregation op '{other}'"))),
            };
            aggregated.insert(field.clone(), Value::Float(value));
        }

        Ok(Value::Map(BTreeMap::from([("aggregated".to_string(), Value::Seq(vec![Value::Map(aggregated)]))])))
    }

    fn describe(&self) -> HandlerMetadata {
        HandlerMetadata::new("applies 'operations' (field -> sum|mean|min|max) across 'input' rows")
    }
}

struct Signal;

#[async_trait]
impl Handler for Signal {
    async fn invoke(&self, payload: &Value, _ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
        Ok(payload.clone())
    }

    fn describe(&self) -> HandlerMetadata {
        HandlerMetadata::new("accepts an event notification and echoes it back")
    }
}

/// Register the demo handler library on `registry`.
pub fn register_all(registry: &Arc<Registry>) {
    let _ = registry.register(PacketKey::new("cf", "ping", None).unwrap(), Arc::new(Ping), false);
    let _ = registry.register(PacketKey::new("df", "transform", None).unwrap(), Arc::new(Transform), false);
    let _ = registry.register(PacketKey::new("df", "validate", None).unwrap(), Arc::new(Validate), false);
    let _ = registry.register(PacketKey::new("df", "aggregate", None).unwrap(), Arc::new(Aggregate), false);
    let _ = registry.register(PacketKey::new("ed", "signal", None).unwrap(), Arc::new(Signal), false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::atom::AtomOutcome;
    use crate::domain::Atom;
    use crate::engine::ExecutionEngine;

    fn engine() -> Arc<ExecutionEngine> {
        let registry = Arc::new(Registry::new());
        register_all(&registry);
        ExecutionEngine::new(registry, "demo", EngineConfig::default())
    }

    fn success(result: crate::domain::AtomResult) -> Value {
        match result.outcome {
            AtomOutcome::Success(value) => value,
            AtomOutcome::Failure(err) => panic!("expected success, got {err:?}"),
        }
    }

    #[tokio::test]
    async fn ping_echoes_and_reports_latency() {
        let engine = engine();
        let mut payload = BTreeMap::new();
        payload.insert("echo".to_string(), Value::Str("x".to_string()));
        payload.insert("timestamp".to_string(), Value::Int(1_700_000_000_000));
        let atom = Atom::new("a1", "cf", "ping", Value::Map(payload));

        let data = success(engine.dispatch(atom).await);
        assert_eq!(data.get("echo").and_then(Value::as_str), Some("x"));
        assert!(data.get("server_time").and_then(Value::as_i64).is_some());
        let server_time = data.get("server_time").and_then(Value::as_i64).unwrap();
        assert_eq!(data.get("latency_ms").and_then(Value::as_i64), Some(server_time - 1_700_000_000_000));
    }

    #[tokio::test]
    async fn transform_uppercases_input() {
        let engine = engine();
        let mut payload = BTreeMap::new();
        payload.insert("input".to_string(), Value::Str("hello world".to_string()));
        payload.insert("operation".to_string(), Value::Str("uppercase".to_string()));
        let atom = Atom::new("t1", "df", "transform", Value::Map(payload));

        let data = success(engine.dispatch(atom).await);
        assert_eq!(data.get("result").and_then(Value::as_str), Some("HELLO WORLD"));
    }

    #[tokio::test]
    async fn validate_accepts_well_formed_email() {
        let engine = engine();
        let mut payload = BTreeMap::new();
        payload.insert("data".to_string(), Value::Str("user@example.com".to_string()));
        payload.insert("schema".to_string(), Value::Str("email".to_string()));
        let atom = Atom::new("v1", "df", "validate", Value::Map(payload));

        let data = success(engine.dispatch(atom).await);
        assert_eq!(data.get("valid").and_then(Value::as_bool), Some(true));
        assert_eq!(data.get("errors").and_then(Value::as_seq).map(<[Value]>::len), Some(0));
    }

    #[tokio::test]
    async fn validate_rejects_malformed_email() {
        let engine = engine();
        let mut payload = BTreeMap::new();
        payload.insert("data".to_string(), Value::Str("bogus".to_string()));
        payload.insert("schema".to_string(), Value::Str("email".to_string()));
        let atom = Atom::new("v2", "df", "validate", Value::Map(payload));

        let data = success(engine.dispatch(atom).await);
        assert_eq!(data.get("valid").and_then(Value::as_bool), Some(false));
    }

    #[tokio::test]
    async fn aggregate_sums_sales_across_all_rows() {
        let engine = engine();
        let rows = vec![
            Value::Map(BTreeMap::from([
                ("region".to_string(), Value::Str("north".to_string())),
                ("sales".to_string(), Value::Int(100)),
            ])),
            Value::Map(BTreeMap::from([
                ("region".to_string(), Value::Str("north".to_string())),
                ("sales".to_string(), Value::Int(200)),
            ])),
            Value::Map(BTreeMap::from([
                ("region".to_string(), Value::Str("south".to_string())),
                ("sales".to_string(), Value::Int(150)),
            ])),
        ];
        let mut payload = BTreeMap::new();
        payload.insert("input".to_string(), Value::Seq(rows));
        payload.insert(
            "operations".to_string(),
            Value::Map(BTreeMap::from([("sales".to_string(), Value::Str("sum".to_string()))])),
        );
        let atom = Atom::new("ag1", "df", "aggregate", Value::Map(payload));

        let data = success(engine.dispatch(atom).await);
        let aggregated = data.get("aggregated").and_then(Value::as_seq).expect("aggregated seq");
        assert_eq!(aggregated[0].get("sales").and_then(Value::as_f64), Some(450.0));
    }
}
