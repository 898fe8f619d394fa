//! Console discovery scanner
//!
//! Probes the LAN (or one host given as an argument) and prints every
//! console that answers within the listen window. Useful for checking
//! network reachability before pairing.

use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::unbounded;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_remote_play::config::ConsoleStore;
use lan_remote_play::console::registry::shared_registry;
use lan_remote_play::discovery::{DiscoveryConfig, DiscoveryService};

const LISTEN_WINDOW: Duration = Duration::from_secs(3);

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = shared_registry();

    // Known consoles from the store show up in the listing even if they
    // stay silent during this scan.
    match ConsoleStore::default_location() {
        Ok(store) => {
            if let Err(e) = store.load(&registry) {
                tracing::warn!("could not load console store: {}", e);
            }
        }
        Err(e) => tracing::warn!("no console store available: {}", e),
    }

    let service = DiscoveryService::new(registry.clone(), DiscoveryConfig::default())?;

    let (update_tx, update_rx) = unbounded::<String>();
    service.set_observer(Box::new(move |name| {
        let _ = update_tx.send(name.to_string());
    }));

    match std::env::args().nth(1) {
        Some(host) => {
            tracing::info!(host = host.as_str(), "probing one host");
            service.probe_one(&host)?;
        }
        None => {
            tracing::info!("probing the local network");
            service.probe_all()?;
        }
    }

    // Collect replies until the window closes
    let deadline = Instant::now() + LISTEN_WINDOW;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match update_rx.recv_timeout(remaining) {
            Ok(name) => tracing::debug!(console = name.as_str(), "reply received"),
            Err(_) => break,
        }
    }

    let guard = registry.lock();
    if guard.is_empty() {
        println!("No consoles found.");
        return Ok(());
    }

    println!("\n=== Known Consoles ===");
    for console in guard.iter() {
        let addr = console
            .addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".into());
        let paired = if console.is_paired() { "paired" } else { "unpaired" };
        let seen = if console.is_discovered() {
            "seen just now"
        } else {
            "not seen"
        };
        println!(
            "  {:<24} {:<16} {:<10} {:<8} {}",
            console.name(),
            addr,
            console.power_state(),
            paired,
            seen
        );
        if let Some(app) = console.running_app() {
            println!("    running: {app}");
        }
    }

    Ok(())
}
