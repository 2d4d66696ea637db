mod automation;
mod commands;
mod config;
mod device;
mod error;
mod simulator;
mod state;
mod view;
mod web;

use anyhow::Result;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use state::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Seed (built-in unless PANEL_CONFIG points at a file) ─────────────
    let cfg = match env::var("PANEL_CONFIG") {
        Ok(path) => config::load(&path)?,
        Err(_) => config::builtin()?,
    };

    let store = Store::new(cfg.build_store(device::now()));
    {
        let snap = store.snapshot().await;
        if snap.is_empty() {
            warn!("no devices configured");
        }
        info!(
            greenhouses = snap.greenhouse_names().len(),
            devices = snap.len(),
            "store seeded"
        );
    }

    // ── Simulator ────────────────────────────────────────────────────────
    let sim = simulator::spawn(store.clone(), fastrand::Rng::new());

    // ── Web API (runs until ctrl-c) ──────────────────────────────────────
    let served = web::serve(store, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
        }
        info!("shutdown requested");
    })
    .await;

    sim.stop().await;
    served
}
