//! schedulerd entry point: loads configuration, bootstraps logging,
//! connects the job store, and runs the Poll Loop and the control plane
//! as sibling tasks until a shutdown signal arrives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use schedulerd_core::config::load_config;
use schedulerd_core::shutdown::{listen_for_shutdown_signals, ShutdownController};
use schedulerd_engine::{ImmediateQueue, PollLoop, Sender};
use schedulerd_store::MySqlJobStore;
use tracing::{error, info};

mod control;

#[derive(Parser, Debug)]
#[command(name = "schedulerd")]
#[command(author, version, about = "Persistent, timezone-aware job scheduler", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    schedulerd_core::logging::init(&config.scheduler.log_file)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %cli.config.display(),
        "starting schedulerd"
    );

    let database_url = format!(
        "mysql://{}:{}@{}:{}/{}?charset={}",
        config.db.user,
        config.db.password,
        config.db.host,
        config.db.port,
        config.db.database,
        config.db.charset,
    );

    let store = Arc::new(
        MySqlJobStore::connect(
            &database_url,
            config.db.pool_size,
            &config.scheduler.mysql_session_time_zone,
        )
        .await?,
    );

    let sender = Arc::new(Sender::new(config.http.clone(), config.mqtt.clone())?);
    let queue = ImmediateQueue::new();

    let poll_loop = PollLoop::new(
        store.clone(),
        sender,
        queue.clone(),
        config.scheduler.default_timezone.clone(),
        Duration::from_secs(config.scheduler.poll_interval_sec.max(1)),
        config.scheduler.batch,
    );

    let shutdown = ShutdownController::new();

    let poll_task = {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            poll_loop.run(shutdown_rx).await;
        })
    };

    let control_task = if config.scheduler.control_enabled {
        let state = control::ControlState {
            queue,
            token: config.scheduler.control_token.clone(),
        };
        let addr: SocketAddr =
            format!("{}:{}", config.scheduler.control_host, config.scheduler.control_port)
                .parse()?;
        let mut shutdown_rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(error = %e, %addr, "failed to bind control plane listener");
                    return;
                }
            };
            info!(%addr, "control plane listening");
            let app = control::router(state);
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "control plane server error");
            }
        }))
    } else {
        info!("control plane disabled by configuration");
        None
    };

    listen_for_shutdown_signals(shutdown).await;

    poll_task.await?;
    if let Some(control_task) = control_task {
        control_task.await?;
    }

    info!("schedulerd shut down cleanly");
    Ok(())
}
