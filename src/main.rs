use log::*;
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use std::time::Duration;
use web::csp::load_csp_mux;
use web::AppState;

mod heartbeat;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting up in {} mode with log level {}",
        config.runtime_env(),
        config.log_level_filter
    );

    let csp = match load_csp_mux(&config) {
        Ok(csp) => csp,
        Err(e) => {
            error!("Failed to load Content-Security-Policy configuration: {e}");
            std::process::exit(1);
        }
    };

    let app_state = AppState::new(config, csp);

    let interval_secs = app_state.config.heartbeat_interval_secs;
    if interval_secs > 0 {
        tokio::spawn(heartbeat::run(
            Arc::clone(&app_state.hub),
            Duration::from_secs(interval_secs),
            app_state.shutdown_signal(),
        ));
    } else {
        info!("Heartbeat events disabled");
    }

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped with an error: {e}");
        std::process::exit(1);
    }

    info!("Server stopped");
}
