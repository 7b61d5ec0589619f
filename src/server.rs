//! Reactor server: binds the Gateway session listener and the REST
//! introspection server and runs them until the process is stopped.
//! Shared by the `packetflow-reactor` and `packetflow-cli run` entry
//! points, in the style of the teacher's `server.rs` bind/serve split.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::codec;
use crate::config::PacketFlowConfig;
use crate::domain::wire::{MessageType, PROTOCOL_VERSION};
use crate::domain::{Value, WireMessage};
use crate::engine::ExecutionEngine;
use crate::gateway::GatewaySession;
use crate::health::{HealthTracker, PingOutcome, Pinger};
use crate::registry::Registry;
use crate::rest_api::{self, AppState};
use crate::router::Router;
use crate::time_provider::production_time_provider;

/// Dials a reactor endpoint with a framed `ping` wire message over TCP.
struct TcpPinger;

#[async_trait]
impl Pinger for TcpPinger {
    async fn ping(&self, endpoint: &str, deadline: Duration) -> Result<PingOutcome, String> {
        let attempt = async {
            let mut stream = tokio::net::TcpStream::connect(endpoint)
                .await
                .map_err(|e| e.to_string())?;

            let request = WireMessage {
                version: PROTOCOL_VERSION,
                message_type: MessageType::Ping,
                sequence: 0,
                timestamp_ms: 0,
                source: "health-tracker".to_string(),
                destination: endpoint.to_string(),
                payload: Value::empty_map(),
                priority: None,
                ttl_secs: None,
                correlation_id: None,
            };
            let bytes = codec::encode(&request).map_err(|e| e.to_string())?;
            stream.write_all(&(bytes.len() as u32).to_be_bytes()).await.map_err(|e| e.to_string())?;
            stream.write_all(&bytes).await.map_err(|e| e.to_string())?;

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.map_err(|e| e.to_string())?;
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await.map_err(|e| e.to_string())?;
            let response = codec::decode(&body).map_err(|e| e.to_string())?;

            if response.message_type != MessageType::Ping {
                return Err("non-ping response to ping".to_string());
            }

            let load_factor = response.payload.get("load").and_then(Value::as_f64).unwrap_or(0.0);

            Ok(PingOutcome { load_factor })
        };

        tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| "ping deadline exceeded".to_string())?
    }
}

/// Run a reactor to completion: bind the Gateway and REST listeners,
/// start the health sweep, and accept connections forever. Returns an
/// `Err` describing a bind failure (caller maps that to exit code 2) or
/// any other runtime failure (exit code 3).
///
/// # Errors
///
/// Returns `Err` if either listener fails to bind, with the string
/// `"bind"` present in the message so callers can distinguish a bind
/// failure from any other runtime error.
pub async fn run(config: PacketFlowConfig) -> Result<(), String> {
    let registry = Arc::new(Registry::new());
    crate::demo_handlers::register_all(&registry);

    let engine = ExecutionEngine::new(Arc::clone(&registry), config.reactor_id.clone(), config.engine.clone());
    let router = Arc::new(Router::new(config.router.clone()));
    let health_tracker = Arc::new(HealthTracker::new(
        Arc::clone(&router),
        Arc::new(TcpPinger),
        config.health.clone(),
        production_time_provider(),
    ));

    {
        let health_tracker = Arc::clone(&health_tracker);
        tokio::spawn(async move {
            health_tracker.run_forever().await;
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| format!("bind {bind_addr}: {e}"))?;
    info!(addr = %bind_addr, "Gateway listening");

    let rest_addr = format!("0.0.0.0:{}", config.port + 1);
    let rest_listener = TcpListener::bind(&rest_addr).await.map_err(|e| format!("bind {rest_addr}: {e}"))?;
    info!(addr = %rest_addr, "REST introspection server listening");

    let app_state = AppState::new(Arc::clone(&engine), Arc::clone(&router), Vec::new());
    let rest_app = rest_api::create_app(app_state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(rest_listener, rest_app).await {
            error!(%e, "REST server terminated");
        }
    });

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%e, "accept failed");
                continue;
            }
        };

        let engine = Arc::clone(&engine);
        let router = Arc::clone(&router);
        let gateway_config = config.gateway.clone();
        let connections = Arc::clone(&app_state.connections);

        tokio::spawn(async move {
            connections.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let mut session = GatewaySession::new(engine, router, gateway_config);
            info!(%peer, "session opened");
            session.run(stream).await;
            info!(%peer, state = ?session.state(), "session closed");
            connections.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        });
    }
}
