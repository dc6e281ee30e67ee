use confluence_core::SignalGenerator;
use confluence_data::{Venue, VenueError, VenueName, create_venue};
use confluence_server::{
    api::{AppState, router},
    config::{LogFormat, ServerConfig},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();
    init_logging(config.log_format);

    info!("Starting confluence signal server");

    let mut state = AppState::new(config.default_venue, config.signal_timeout);
    for name in VenueName::ALL {
        match create_venue(&config.venue_config(name)) {
            Ok(venue) => {
                if name == config.default_venue {
                    validate_credentials(&config, venue.as_ref()).await;
                }
                state = state.with_generator(name, SignalGenerator::new(venue.into_provider()));
                info!(venue = %name, "venue available");
            }
            Err(VenueError::NotSupported(venue)) => {
                debug!(%venue, "skipping venue without an implementation");
            }
            Err(error) => {
                error!(venue = %name, %error, "failed to initialise venue");
            }
        }
    }

    let addr = config.bind_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%addr, %error, "failed to bind listener");
            return;
        }
    };

    info!(
        %addr,
        default_venue = %config.default_venue,
        timeout = ?config.signal_timeout,
        "Signal server listening"
    );

    let app = router(Arc::new(state));
    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%error, "server terminated with error");
    }

    info!("Signal server stopped");
}

/// Log the outcome of a credential check. A failed check never stops the server.
async fn validate_credentials(config: &ServerConfig, venue: &dyn Venue) {
    if !config.venue_config(venue.name()).has_credentials() {
        info!(venue = %venue.name(), "no credentials configured, serving public market data");
        return;
    }

    if venue.validate_credentials().await {
        info!(venue = %venue.name(), "venue credentials validated");
    } else {
        warn!(venue = %venue.name(), "venue credential validation failed, continuing with public market data");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
