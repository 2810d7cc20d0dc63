//! AeroWatch Server - autonomous security drone coordinator

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use aerowatch_core::GeofenceEngine;
use aerowatch_server::backoff::Backoff;
use aerowatch_server::config::Config;
use aerowatch_server::loops::control_loop::ControlCoordinator;
use aerowatch_server::state::{AppState, SharedGeofence};
use aerowatch_server::vehicle::{VehicleController, VehicleHandle};
use aerowatch_server::{api, link, logging};

#[derive(Debug, Parser)]
#[command(name = "aerowatch-server", version, about = "Autonomous security drone coordinator")]
struct Args {
    /// JSON configuration file; missing keys fall back to defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fly the built-in simulated vehicle instead of a real link
    #[arg(long)]
    simulation: bool,

    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Gateway port (overrides config and AEROWATCH_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug, args.log_json)?;

    tracing::info!("Starting AeroWatch Server...");

    let mut config = Config::load(args.config.as_deref())?;
    if args.simulation {
        config.simulation.enabled = true;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let geofence = SharedGeofence::new(
        GeofenceEngine::new(&config.geofence).context("Invalid geofence configuration")?,
    );
    tracing::info!(
        "Geofence ready with {} boundaries",
        geofence.read().boundary_count()
    );

    let (downlink, _) = broadcast::channel(256);
    let flight_link = link::from_config(&config).context("Failed to create flight link")?;
    let controller = VehicleController::new(flight_link, geofence.clone(), config.vehicle.clone());
    let vehicle = VehicleHandle::new(controller, config.safety.clone(), downlink);

    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let home = vehicle
        .connect_with_retry(config.vehicle.connect_attempts, backoff)
        .await
        .context("Failed to connect to vehicle")?;
    tracing::info!(
        "Vehicle ready on {} link, home {}",
        vehicle.lock().await.link_kind(),
        home
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (coordinator, inputs) = ControlCoordinator::new(vehicle.clone(), config.emergency.clone());
    let state = Arc::new(AppState::new(vehicle, geofence, inputs));

    let control = tokio::spawn(coordinator.run(shutdown_tx.subscribe()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt signal");
            let _ = signal_tx.send(());
        }
    });

    let app = api::routes().with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .context("Invalid gateway address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    // The control loop ends on a shutdown command, a vehicle fault or the signal
    if let Err(err) = control.await {
        tracing::error!("Control loop task failed: {}", err);
    }
    let _ = shutdown_tx.send(());

    server.await??;
    tracing::info!("AeroWatch Server stopped");
    Ok(())
}
