#![forbid(unsafe_code)]

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tandem_hub::config::HubConfig;
use tandem_hub::{room, AppState};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tandem-hub")]
#[command(about = "Tandem real-time collaboration hub")]
struct Args {
    /// Listen address, overriding TANDEM_HUB_BIND_ADDR
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tandem_common::init_tracing_with_default("tandem_hub=info,tower_http=info");

    let args = Args::parse();
    let mut config = HubConfig::from_env();
    if let Some(listen) = args.listen {
        config.bind_addr = listen;
    }

    let state = AppState::new(config.clone());
    let hub = state.hub.clone();

    tokio::spawn(room::run_reaper(hub.clone(), config.cleanup_interval));

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("hub listening on {}", listener.local_addr()?);
    info!("registry at {}", config.core_base_url);

    let app = tandem_hub::router(state);
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down hub");
            hub.close_all().await;
            let _ = drain_tx.send(());
            match tokio::time::timeout(config.shutdown_timeout, &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    error!("shutdown timeout exceeded, aborting server");
                    server.abort();
                }
            }
        }
        result = &mut server => result??,
    }

    info!("hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
