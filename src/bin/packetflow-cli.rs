//! `packetflow-cli`: operator entry point wrapping the reactor binary's
//! startup path, plus an in-process `demo` mode for exercising the
//! handler library without a network listener.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use packetflow::config::PacketFlowConfig;
use packetflow::domain::{Atom, Value};
use packetflow::engine::ExecutionEngine;
use packetflow::registry::Registry;

#[derive(Parser)]
#[command(name = "packetflow-cli", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a reactor bound to `PORT`, registering handlers and serving
    /// the Gateway and REST introspection endpoints. The default.
    Run,
    /// Exercise the demo handler library in-process and exit, without
    /// binding any socket.
    Demo,
}

async fn demo() -> Result<(), String> {
    let registry = Arc::new(Registry::new());
    packetflow::demo_handlers::register_all(&registry);
    let engine = ExecutionEngine::new(registry, "demo-cli", packetflow::config::EngineConfig::default());

    let mut payload = std::collections::BTreeMap::new();
    payload.insert("input".to_string(), Value::Str("hello from packetflow".to_string()));
    payload.insert("operation".to_string(), Value::Str("uppercase".to_string()));
    let atom = Atom::new("demo-1", "df", "transform", Value::Map(payload));

    let result = engine.dispatch(atom).await;
    info!(?result, "demo dispatch complete");
    println!("{result:?}");

    if result.is_success() {
        Ok(())
    } else {
        Err("demo atom failed".to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PacketFlowConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    packetflow::observability::init(&config.log_level);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => match packetflow::server::run(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) if e.contains("bind") => {
                eprintln!("bind error: {e}");
                ExitCode::from(2)
            }
            Err(e) => {
                eprintln!("uncaught runtime error: {e}");
                ExitCode::from(3)
            }
        },
        Command::Demo => match demo().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("demo failed: {e}");
                ExitCode::from(3)
            }
        },
    }
}
