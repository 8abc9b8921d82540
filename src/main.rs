use clap::Parser;
use dotenv::dotenv;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::error::Error;
use std::io::Write;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use xrpwatch::api::binance::ws::FeedListener;
use xrpwatch::config::Config;
use xrpwatch::engine::notify;
use xrpwatch::server;
use xrpwatch::state::AppState;

fn init_logger(level: LevelFilter) {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("xrpwatch", level)
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let config = Config::parse();

    init_logger(config.level_filter().unwrap_or(LevelFilter::Info));
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    info!("Starting xrpwatch for {}...", config.symbol());

    let state = match AppState::new(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    let listener = TcpListener::bind(config.listen_addr()).await?;

    let (notify_tx, notify_rx) = mpsc::channel(100);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier_handle = tokio::spawn(notify::run_notifier(notify_rx));

    let feed_handle = tokio::spawn(
        FeedListener::new(config.stream_url(), state.clone(), notify_tx).run(shutdown_rx.clone()),
    );

    let server_handle = tokio::spawn(server::serve(listener, state.clone(), shutdown_rx));

    shutdown_signal().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let (feed, server) = tokio::join!(feed_handle, server_handle);
    if let Err(e) = feed {
        error!("Feed task failed: {}", e);
    }
    match server {
        Ok(Err(e)) => error!("HTTP API failed: {}", e),
        Err(e) => error!("HTTP API task failed: {}", e),
        Ok(Ok(())) => {}
    }
    // The feed listener owned the only sender, so the notifier drains and exits.
    if let Err(e) = notifier_handle.await {
        error!("Notifier task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
