//! Gateway Front-End: terminates client byte-stream sessions, multiplexes
//! many concurrent atoms, and connects them to the Router/Execution
//! Engine. Built generically over `AsyncRead + AsyncWrite` so tests can
//! drive it over an in-memory duplex stream rather than a real socket,
//! in the style of the teacher's `server.rs` test harness.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, warn};

use crate::codec::{self, SequenceCounter};
use crate::config::GatewayConfig;
use crate::domain::wire::{MessageType, PROTOCOL_VERSION};
use crate::domain::{Atom, AtomResult, ReactorDescriptor, Value, WireMessage};
use crate::engine::ExecutionEngine;
use crate::error::PacketFlowError;
use crate::router::Router;

/// Per-session lifecycle, mirroring the Gateway's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, no frame decoded yet.
    Opened,
    /// At least one frame has been successfully decoded.
    Active,
    /// Shutting down; outstanding dispatches are draining.
    Closing,
    /// Fully torn down.
    Closed,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

enum FrameRead<'a> {
    Complete(&'a [u8], &'a [u8]),
    Incomplete,
    TooLarge(usize),
}

fn read_frame_bytes(buf: &[u8], max_frame_size: usize) -> FrameRead<'_> {
    if buf.len() < 4 {
        return FrameRead::Incomplete;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_frame_size {
        return FrameRead::TooLarge(len);
    }
    if buf.len() < 4 + len {
        return FrameRead::Incomplete;
    }
    FrameRead::Complete(&buf[4..4 + len], &buf[4 + len..])
}

fn atom_from_payload(payload: &Value) -> Result<Atom, PacketFlowError> {
    let identifier = payload
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| PacketFlowError::Validation("missing atom id".to_string()))?
        .to_string();
    let group = payload
        .get("g")
        .and_then(Value::as_str)
        .ok_or_else(|| PacketFlowError::Validation("missing atom group".to_string()))?
        .to_string();
    let element = payload
        .get("e")
        .and_then(Value::as_str)
        .ok_or_else(|| PacketFlowError::Validation("missing atom element".to_string()))?
        .to_string();
    let atom_payload = payload.get("d").cloned().unwrap_or_else(Value::empty_map);
    Ok(Atom::new(identifier, group, element, atom_payload))
}

fn error_record_value(err: &crate::domain::atom::ErrorRecord) -> Value {
    let mut map = BTreeMap::new();
    map.insert("code".to_string(), Value::Str(err.code.clone()));
    map.insert("message".to_string(), Value::Str(err.message.clone()));
    map.insert("permanent".to_string(), Value::Bool(err.permanent));
    Value::Map(map)
}

/// Build the `result`/`error` frame payload for a single submitted atom,
/// per the result/error payload shapes: `{sequence, data, timestamp}` or
/// `{sequence, error:{code,message,permanent}, timestamp}`.
fn result_frame_payload(sequence: u64, result: &AtomResult) -> Value {
    let mut map = BTreeMap::new();
    map.insert("sequence".to_string(), Value::Int(sequence as i64));
    map.insert("timestamp".to_string(), Value::Int(now_ms() as i64));
    match &result.outcome {
        crate::domain::atom::AtomOutcome::Success(value) => {
            map.insert("data".to_string(), value.clone());
        }
        crate::domain::atom::AtomOutcome::Failure(err) => {
            map.insert("error".to_string(), error_record_value(err));
        }
    }
    Value::Map(map)
}

/// Build one entry of a `batch_submit` response's `batch_results` array:
/// `{atom_id, result|error}`.
fn batch_item_payload(atom_id: &str, result: &AtomResult) -> Value {
    let mut map = BTreeMap::new();
    map.insert("atom_id".to_string(), Value::Str(atom_id.to_string()));
    match &result.outcome {
        crate::domain::atom::AtomOutcome::Success(value) => {
            map.insert("result".to_string(), value.clone());
        }
        crate::domain::atom::AtomOutcome::Failure(err) => {
            map.insert("error".to_string(), error_record_value(err));
        }
    }
    Value::Map(map)
}

/// A single client connection's session state and dispatch loop.
pub struct GatewaySession {
    engine: Arc<ExecutionEngine>,
    router: Arc<Router>,
    config: GatewayConfig,
    sequence: SequenceCounter,
    in_flight: Arc<Semaphore>,
    state: SessionState,
}

impl GatewaySession {
    /// Build a session over shared core components.
    #[must_use]
    pub fn new(engine: Arc<ExecutionEngine>, router: Arc<Router>, config: GatewayConfig) -> Self {
        let permits = config.max_in_flight_per_session;
        GatewaySession {
            engine,
            router,
            config,
            sequence: SequenceCounter::new(),
            in_flight: Arc::new(Semaphore::new(permits)),
            state: SessionState::Opened,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the read-decode-dispatch-write loop until the stream closes or
    /// a non-recoverable frame error occurs.
    pub async fn run<S>(&mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(bytes) = rx.recv().await {
                let len = (bytes.len() as u32).to_be_bytes();
                if writer.write_all(&len).await.is_err() || writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut buf = Vec::new();
        let mut scratch = [0u8; 4096];

        loop {
            match read_frame_bytes(&buf, self.config.max_frame_size) {
                FrameRead::TooLarge(len) => {
                    warn!(len, max = self.config.max_frame_size, "frame exceeds max_frame_size, closing session");
                    self.state = SessionState::Closing;
                    break;
                }
                FrameRead::Complete(frame, rest) => {
                    let frame = frame.to_vec();
                    let rest_len = rest.len();
                    let drained = buf.len() - rest_len;
                    buf.drain(0..drained);

                    self.state = SessionState::Active;

                    let decoded = codec::decode(&frame);
                    match decoded {
                        Ok(message) => {
                            let permit = Arc::clone(&self.in_flight);
                            let engine = Arc::clone(&self.engine);
                            let router = Arc::clone(&self.router);
                            let tx = tx.clone();
                            let response_sequence = self.sequence.next();

                            // Backpressure: acquiring a permit here means
                            // the read loop keeps consuming frames from
                            // the already-buffered bytes, but the
                            // dispatch itself stalls until a permit
                            // frees up, which is what bounds in-flight
                            // work per session.
                            tokio::spawn(async move {
                                let _permit = permit.acquire_owned().await;
                                let response = dispatch_message(&engine, &router, message, response_sequence).await;
                                if let Ok(bytes) = codec::encode(&response) {
                                    let _ = tx.send(bytes);
                                }
                            });
                        }
                        Err(e) => {
                            warn!(%e, "dropping malformed frame");
                            self.state = SessionState::Closing;
                        }
                    }

                    if self.state == SessionState::Closing {
                        break;
                    }
                    continue;
                }
                FrameRead::Incomplete => {
                    match reader.read(&mut scratch).await {
                        Ok(0) => {
                            debug!("peer closed connection");
                            break;
                        }
                        Ok(n) => buf.extend_from_slice(&scratch[..n]),
                        Err(e) => {
                            error!(%e, "transport read error");
                            break;
                        }
                    }
                }
            }
        }

        self.state = SessionState::Closing;
        drop(tx);
        let _ = writer_task.await;
        self.state = SessionState::Closed;
    }
}

async fn dispatch_message(
    engine: &Arc<ExecutionEngine>,
    router: &Arc<Router>,
    message: WireMessage,
    response_sequence: u64,
) -> WireMessage {
    let base = |message_type: MessageType, payload: Value| WireMessage {
        version: PROTOCOL_VERSION,
        message_type,
        sequence: response_sequence,
        timestamp_ms: now_ms(),
        source: message.destination.clone(),
        destination: message.source.clone(),
        payload,
        priority: None,
        ttl_secs: None,
        correlation_id: message.correlation_id.clone(),
    };

    match message.message_type {
        MessageType::Submit => match atom_from_payload(&message.payload) {
            Ok(atom) => {
                let result = engine.dispatch(atom).await;
                let message_type = if result.is_success() { MessageType::Result } else { MessageType::Error };
                base(message_type, result_frame_payload(response_sequence, &result))
            }
            Err(e) => {
                let failed = AtomResult::failure(
                    crate::domain::atom::ErrorRecord::from_error(&e),
                    crate::domain::ResponseMeta {
                        duration_ms: 0,
                        reactor_id: String::new(),
                        timestamp_ms: now_ms(),
                        packet_key: String::new(),
                    },
                );
                base(MessageType::Error, result_frame_payload(response_sequence, &failed))
            }
        },

        MessageType::BatchSubmit => {
            let atoms = message
                .payload
                .get("atoms")
                .and_then(Value::as_seq)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();

            let mut results = Vec::with_capacity(atoms.len());
            for atom_payload in &atoms {
                match atom_from_payload(atom_payload) {
                    Ok(atom) => {
                        let id = atom.identifier.clone();
                        let result = engine.dispatch(atom).await;
                        results.push(batch_item_payload(&id, &result));
                    }
                    Err(e) => {
                        let failed = AtomResult::failure(
                            crate::domain::atom::ErrorRecord::from_error(&e),
                            crate::domain::ResponseMeta {
                                duration_ms: 0,
                                reactor_id: String::new(),
                                timestamp_ms: now_ms(),
                                packet_key: String::new(),
                            },
                        );
                        results.push(batch_item_payload("unknown", &failed));
                    }
                }
            }

            let mut payload = BTreeMap::new();
            payload.insert("batch_results".to_string(), Value::Seq(results));
            base(MessageType::Result, Value::Map(payload))
        }

        MessageType::Ping => {
            let echo = message.payload.get("echo").cloned().unwrap_or(Value::Null);
            let ceiling = engine.concurrency_ceiling();
            let load = if ceiling == 0 { 0.0 } else { engine.in_flight() as f64 / ceiling as f64 };
            let mut payload = BTreeMap::new();
            payload.insert("echo".to_string(), echo);
            payload.insert("server_time".to_string(), Value::Int(now_ms() as i64));
            payload.insert("load".to_string(), Value::Float(load));
            base(MessageType::Ping, Value::Map(payload))
        }

        MessageType::Register => {
            let specializations = message
                .payload
                .get("specializations")
                .and_then(Value::as_seq)
                .map(|seq| {
                    seq.iter()
                        .filter_map(Value::as_str)
                        .filter_map(specialization_from_str)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let identifier = message
                .payload
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(message.source.as_str())
                .to_string();
            let endpoint = message
                .payload
                .get("endpoint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let capacity = message
                .payload
                .get("capacity")
                .and_then(Value::as_i64)
                .unwrap_or(100) as u32;

            router.add(ReactorDescriptor::new(identifier, endpoint, specializations, capacity));

            let mut payload = BTreeMap::new();
            payload.insert("ok".to_string(), Value::Bool(true));
            base(MessageType::Result, Value::Map(payload))
        }

        MessageType::Result | MessageType::Error => {
            base(MessageType::Error, error_payload(&PacketFlowError::Validation(
                "clients may not submit result/error frames".to_string(),
            )))
        }
    }
}

fn specialization_from_str(s: &str) -> Option<crate::domain::affinity::Specialization> {
    use crate::domain::affinity::Specialization::{CpuBound, General, IoBound, MemoryBound, NetworkBound};
    match s {
        "cpu_bound" => Some(CpuBound),
        "memory_bound" => Some(MemoryBound),
        "io_bound" => Some(IoBound),
        "network_bound" => Some(NetworkBound),
        "general" => Some(General),
        _ => None,
    }
}

fn error_payload(error: &PacketFlowError) -> Value {
    let mut map = BTreeMap::new();
    map.insert("code".to_string(), Value::Str(error.code().to_string()));
    map.insert("message".to_string(), Value::Str(error.to_string()));
    map.insert("permanent".to_string(), Value::Bool(error.is_permanent()));
    Value::Map(map)
}
