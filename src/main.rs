//! Sitewatch - website availability and expiry monitoring.
//!
//! Periodically checks every target for HTTP status, TLS certificate expiry
//! and domain registration expiry, and raises alerts through email and
//! webhook channels.

mod alert;
mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod web;

use alert::AlertEvaluator;
use config::ServerConfig;
use db::Store;
use notify::ChannelNotifier;
use probe::Probers;
use scheduler::{CheckOrchestrator, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("sitewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Sitewatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Check engine
    let probers = Probers::from_settings(&cfg.probes)?;
    let evaluator = AlertEvaluator::from_settings(&cfg.alerts);
    let notifier = notify::notifier_from_settings(&cfg.notify)?;
    let orchestrator = CheckOrchestrator::new(store.clone(), probers, evaluator, notifier)
        .with_concurrency(cfg.concurrency);

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(orchestrator, cfg.check_interval));
    let scheduler_task = scheduler.start();

    // Local channels serve the notification endpoint
    let channels = Arc::new(ChannelNotifier::from_settings(&cfg.notify)?);

    // Start web server
    let server = Server::new(cfg, store, scheduler.clone(), channels);
    let result = server.start().await;

    scheduler.stop();
    let _ = scheduler_task.await;

    result
}
