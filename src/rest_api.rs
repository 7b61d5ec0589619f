//! Health/info/stats introspection endpoints, exposed alongside the
//! binary protocol. Convenience surfaces only — the wire protocol is
//! authoritative. Follows the teacher's `rest_api.rs` `axum::Router` +
//! `with_state` shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::domain::affinity::Specialization;
use crate::domain::wire::PROTOCOL_VERSION;
use crate::engine::ExecutionEngine;
use crate::router::Router as PacketRouter;

/// Shared state backing the introspection endpoints.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ExecutionEngine>,
    router: Arc<PacketRouter>,
    specializations: Vec<Specialization>,
    started_at: Instant,
    /// Live Gateway session count; the Gateway increments/decrements this
    /// as sessions open and close.
    pub connections: Arc<AtomicU64>,
}

impl AppState {
    /// Build introspection state over the shared engine and router.
    #[must_use]
    pub fn new(engine: Arc<ExecutionEngine>, router: Arc<PacketRouter>, specializations: Vec<Specialization>) -> Self {
        AppState {
            engine,
            router,
            specializations,
            started_at: Instant::now(),
            connections: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// `GET /health` response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    load_percent: f64,
    queue_depth: usize,
    uptime_seconds: u64,
    connections: u64,
    processed: u64,
    errors: u64,
}

/// `GET /info` response.
#[derive(Debug, Serialize)]
struct InfoResponse {
    reactor_id: String,
    version: String,
    protocol_version: u8,
    specializations: Vec<Specialization>,
    supported_groups: Vec<&'static str>,
    registered_packet_keys: Vec<String>,
    capacity: usize,
    features: Vec<&'static str>,
}

/// Per-handler counters reported by `GET /stats`.
#[derive(Debug, Serialize)]
struct HandlerStatsEntry {
    packet_key: String,
    call_count: u64,
    error_count: u64,
    average_duration_ms: f64,
}

/// `GET /stats` response: `/info`'s fields plus per-handler counters.
#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    info: InfoResponse,
    handlers: Vec<HandlerStatsEntry>,
}

const FEATURES: [&str; 3] = ["pipelines", "batch_submit", "inter_packet_calls"];
const SUPPORTED_GROUPS: [&str; 6] = ["cf", "df", "ed", "co", "mc", "rm"];

/// Build the Axum application exposing `/health`, `/info`, `/stats`.
#[must_use]
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let descriptors = state.router.snapshot();
    let load_percent = if descriptors.is_empty() {
        0.0
    } else {
        descriptors.iter().map(|d| d.load_factor).sum::<f64>() / descriptors.len() as f64 * 100.0
    };

    Json(HealthResponse {
        ok: state.router.health_fraction() > 0.0 || descriptors.is_empty(),
        load_percent,
        queue_depth: state.engine.in_flight(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: state.connections.load(Ordering::Relaxed),
        processed: state.engine.stats().processed(),
        errors: state.engine.stats().errors(),
    })
}

fn build_info(state: &AppState) -> InfoResponse {
    InfoResponse {
        reactor_id: state.engine.reactor_id().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION,
        specializations: state.specializations.clone(),
        supported_groups: SUPPORTED_GROUPS.to_vec(),
        registered_packet_keys: state
            .engine
            .registry()
            .list()
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect(),
        capacity: state.engine.concurrency_ceiling(),
        features: FEATURES.to_vec(),
    }
}

async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(build_info(&state))
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let info = build_info(&state);
    let handlers = state
        .engine
        .registry()
        .list()
        .into_iter()
        .filter_map(|(key, _)| {
            state.engine.registry().lookup(&key).map(|record| HandlerStatsEntry {
                packet_key: key.to_string(),
                call_count: record.stats().call_count(),
                error_count: record.stats().error_count(),
                average_duration_ms: record.stats().average_duration_ms(),
            })
        })
        .collect();

    Json(StatsResponse { info, handlers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, RouterConfig};
    use crate::domain::handler::{Handler, HandlerMetadata};
    use crate::domain::{PacketKey, Value};
    use crate::error::PacketFlowError;
    use crate::registry::Registry;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn invoke(&self, payload: &Value, _ctx: &crate::engine::ExecutionContext) -> Result<Value, PacketFlowError> {
            Ok(payload.clone())
        }

        fn describe(&self) -> HandlerMetadata {
            HandlerMetadata::new("echoes its input")
        }
    }

    fn state() -> AppState {
        let registry = Arc::new(Registry::new());
        registry
            .register(PacketKey::new("cf", "ping", None).unwrap(), Arc::new(Echo), false)
            .unwrap();
        let engine = ExecutionEngine::new(registry, "r1", EngineConfig::default());
        let router = Arc::new(PacketRouter::new(RouterConfig::default()));
        AppState::new(engine, router, vec![Specialization::General])
    }

    #[tokio::test]
    async fn health_reports_zero_load_with_no_descriptors() {
        let response = health(State(state())).await;
        assert_eq!(response.0.load_percent, 0.0);
        assert_eq!(response.0.processed, 0);
    }

    #[tokio::test]
    async fn info_reports_registered_packet_keys() {
        let response = info(State(state())).await;
        assert_eq!(response.0.registered_packet_keys, vec!["cf:ping".to_string()]);
        assert_eq!(response.0.protocol_version, PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn stats_includes_per_handler_counters() {
        let response = stats(State(state())).await;
        assert_eq!(response.0.handlers.len(), 1);
        assert_eq!(response.0.handlers[0].packet_key, "cf:ping");
        assert_eq!(response.0.handlers[0].call_count, 0);
    }
}
