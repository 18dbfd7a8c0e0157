//! Thin binary: load configuration, initialize logging, wire the façade to
//! the local command surface. All real logic lives in the library crate —
//! grounded on the teacher's `main.rs`, stripped of its tauri/tray/GUI shell
//! since this build has no desktop window, just a local HTTP control plane.

use log::info;
use rolling_capture_engine::{log_setup, EngineConfig, SessionFacade};

#[tokio::main]
async fn main() {
    let config = EngineConfig::load();

    let log_path = log_setup::default_log_path();
    if let Err(e) = log_setup::setup_logging(&log_path) {
        eprintln!("failed to initialize logging at {log_path:?}: {e}");
    }

    info!("rolling-capture-engine starting with config: {config:?}");

    let facade = SessionFacade::new(config.clone());
    facade.on_event(Box::new(|event| {
        log::debug!("event: {event:?}");
    }));

    rolling_capture_engine::server::start_server(facade, config.local_port).await;
}
