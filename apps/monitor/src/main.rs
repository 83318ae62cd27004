use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{load_settings, AppStore, Endpoint, NotificationLevel, StoreSnapshot};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Headless status monitor for the image gateway backend.
#[derive(Parser, Debug)]
struct Args {
    /// Backend base URL; persisted for later runs.
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Also reload the processed-image catalog at startup.
    #[arg(long)]
    with_catalog: bool,
    /// Run one refresh and exit instead of polling.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(secs) = args.interval_secs.filter(|secs| *secs > 0) {
        settings.poll_interval = Duration::from_secs(secs);
    }

    let store = AppStore::from_settings(&settings).context("failed to build store")?;
    if let Some(raw) = args.base_url.as_deref() {
        let endpoint = Endpoint::parse(raw).context("invalid --base-url")?;
        store.set_endpoint(endpoint).await;
    }
    info!(base_url = %store.base_url(), "monitoring backend");

    store.initialize().await;
    if args.with_catalog {
        let _ = store.refresh_catalog().await;
    }
    log_snapshot(&store.snapshot());

    if args.once {
        return Ok(());
    }

    let mut snapshots = store.watch();
    let mut notifications = store.subscribe();
    store
        .start_polling(settings.poll_interval, settings.poll_session)
        .await;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log_snapshot(&snapshot);
            }
            received = notifications.recv() => match received {
                Ok(note) => match note.level {
                    NotificationLevel::Success => info!(message = %note.message, "notification"),
                    NotificationLevel::Error => error!(message = %note.message, "notification"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    store.shutdown().await;
    Ok(())
}

fn log_snapshot(snapshot: &StoreSnapshot) {
    info!(
        base_url = %snapshot.base_url,
        reachable = snapshot.reachability.reachable,
        server = %snapshot.reachability.message,
        logged_in = snapshot.session.is_connected(),
        handle = snapshot.session.handle().unwrap_or("-"),
        items = snapshot.items.len(),
        busy = snapshot.busy(),
        "status"
    );
}
