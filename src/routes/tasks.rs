// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Scheduler callbacks.
//!
//! These endpoints are called by Cloud Scheduler, not directly by users.
//! `create_router` wraps them in scheduler OIDC verification.

use crate::error::Result;
use crate::services::recharge::RechargeReport;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

/// Task handler routes (called by Cloud Scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/energy-recharge", post(energy_recharge))
}

/// Run one energy recharge pass.
///
/// Per-user failures are reported in the body with a 200; only a failed
/// user scan returns 500.
async fn energy_recharge(State(state): State<Arc<AppState>>) -> Result<Json<RechargeReport>> {
    tracing::info!("Energy recharge triggered by scheduler");

    let report = state.recharger.run(chrono::Utc::now()).await?;

    Ok(Json(report))
}
