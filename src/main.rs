// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Energy Recharge Service
//!
//! Cloud Run service invoked by Cloud Scheduler to replenish user energy in
//! Firestore and notify users whose energy is full.

use energy_recharge::{
    config::Config,
    db::{EnergyStore, FirestoreDb},
    services::{
        spawn_local_ticker, EnergyRecharger, FcmNotifier, LogNotifier, Notifier,
        SchedulerTokenVerifier,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        schedule = %config.schedule,
        time_zone = %config.schedule_time_zone,
        interval_minutes = config.recharge_interval_minutes,
        "Starting Energy Recharge service"
    );

    let db: Arc<dyn EnergyStore> = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);

    let notifier: Arc<dyn Notifier> = if config.push_notifications_enabled {
        Arc::new(FcmNotifier::new(&config.gcp_project_id).await?)
    } else {
        tracing::warn!("Push notifications disabled, notifications will only be logged");
        Arc::new(LogNotifier)
    };

    let recharger = Arc::new(EnergyRecharger::from_config(db, notifier, &config));

    let oidc_verifier = Arc::new(SchedulerTokenVerifier::new(&config)?);

    if config.local_scheduler_enabled {
        let period = recharger.policy().interval.to_std()?;
        spawn_local_ticker(recharger.clone(), period);
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        recharger,
        oidc_verifier,
    });

    let app = energy_recharge::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("energy_recharge=debug,info")),
        )
        .with(format)
        .init();
}
