// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens storage, builds the handler registry, then runs the webhook server
//! and the send foreman side by side until a shutdown signal arrives. On
//! shutdown the server stops accepting connections, in-flight sends finish
//! and the database WAL is checkpointed.

use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{Backend, CourierError};
use courier_gateway::{GatewayState, start_server};
use courier_sender::{Foreman, Sender};
use courier_storage::SqliteBackend;
use tracing::{error, info};

use crate::shutdown;

/// Runs the `courier serve` command.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.logging.level);

    let backend = Arc::new(SqliteBackend::open(&config.storage, &config.queue, &config.sender).await?);
    let registry = Arc::new(courier_handlers::build_registry(&config.handlers, &config.http)?);
    if registry.is_empty() {
        return Err(CourierError::Config(
            "no channel handlers enabled, check handlers.include / handlers.exclude".into(),
        ));
    }
    info!(
        handlers = ?registry.channel_types(),
        database = %config.storage.database_path,
        "courier starting"
    );

    let cancel = shutdown::install_signal_handler();

    let sender = Arc::new(Sender::new(
        backend.clone(),
        registry.clone(),
        config.sender.send_timeout(),
    ));
    let foreman = Foreman::from_config(sender, backend.queue(), &config.queue, &config.sender);
    let foreman_task = tokio::spawn(foreman.run(cancel.clone()));

    let state = GatewayState::new(backend.clone(), registry, &config.server);
    let served = start_server(&config.server, state, cancel.clone()).await;
    if served.is_err() {
        // Bind failures return immediately; stop the workers too.
        cancel.cancel();
    }

    match foreman_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "foreman exited with error"),
        Err(e) => error!(error = %e, "foreman task panicked"),
    }

    if let Err(e) = backend.checkpoint().await {
        error!(error = %e, "WAL checkpoint on shutdown failed");
    }
    info!("courier stopped");
    served
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},tower_http={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
