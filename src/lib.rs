// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Energy Recharge: scheduled energy replenishment for game users
//!
//! This crate provides the Cloud Run service that Cloud Scheduler calls to
//! recharge every user's energy in Firestore and push a notification when
//! it is full.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{EnergyRecharger, SchedulerTokenVerifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub recharger: Arc<EnergyRecharger>,
    pub oidc_verifier: Arc<SchedulerTokenVerifier>,
}
