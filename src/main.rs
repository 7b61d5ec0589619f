//! `packetflow-reactor`: binds a Gateway session listener and a REST
//! introspection server, in the style of the teacher's `main.rs`.

use std::process::ExitCode;

use tracing::{error, info};

use packetflow::config::PacketFlowConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PacketFlowConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    packetflow::observability::init(&config.log_level);

    info!(reactor_id = %config.reactor_id, port = config.port, "starting packetflow-reactor");

    match packetflow::server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.contains("bind") => {
            error!(%e, "bind error");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(%e, "uncaught runtime error");
            ExitCode::from(3)
        }
    }
}
