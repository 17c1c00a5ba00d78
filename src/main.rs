use clap::Parser;

use engine_gate::cli::Cli;
use engine_gate::lifecycle::{signals, Shutdown};
use engine_gate::net::listener::Listener;
use engine_gate::observability::{logging, metrics};
use engine_gate::{ProxyError, ProxyServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load_config().map_err(ProxyError::from)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "engine-gate starting");

    for warning in cli.startup_warnings(&config) {
        tracing::warn!("{}", warning);
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        socket = %config.backend.socket_path.display(),
        auth_endpoint = %config.auth.endpoint,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr).map_err(ProxyError::from)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ProxyServer::new(&config)?;
    let listener = Listener::bind(&config.listener)
        .await
        .map_err(ProxyError::from)?;

    let shutdown = Shutdown::new();
    let mut accept_loop = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let finished = tokio::select! {
        _ = signals::shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
            accept_loop.await
        }
        finished = &mut accept_loop => finished,
    };

    match finished {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Accept loop failed"),
        Err(e) => tracing::error!(error = %e, "Accept loop panicked"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
