// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup. Cloud Run injects everything as plain
//! environment variables, and `.env` is honoured for local development.

use crate::services::recharge::{DEFAULT_ENERGY_MAX, DEFAULT_RECHARGE_INTERVAL_MINUTES};
use std::env;
use std::str::FromStr;

/// Header Cloud Scheduler attaches to every HTTP target invocation.
pub const SCHEDULER_HEADER: &str = "x-cloudscheduler";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID (Firestore and FCM)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Public service URL, used as the expected OIDC audience
    pub api_url: String,
    /// Service account Cloud Scheduler signs its OIDC tokens as
    pub scheduler_service_account: String,

    // --- Recharge policy ---
    /// Minutes per energy point
    pub recharge_interval_minutes: i64,
    /// Capacity used when a user record has no `energy_max`
    pub default_energy_max: i64,
    /// Documents fetched per page while scanning users
    pub user_page_size: u32,
    /// Users processed concurrently within one run
    pub max_concurrent_recharges: usize,

    // --- Scheduling ---
    /// Cloud Scheduler cadence this service is deployed with
    pub schedule: String,
    /// Time zone of the Cloud Scheduler job
    pub schedule_time_zone: String,
    /// Run the job from an in-process ticker (local development only)
    pub local_scheduler_enabled: bool,
    /// Deliver push notifications through FCM; log them otherwise
    pub push_notifications_enabled: bool,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            api_url: "http://localhost:8080".to_string(),
            scheduler_service_account: "energy-scheduler@test-project.iam.gserviceaccount.com"
                .to_string(),
            recharge_interval_minutes: DEFAULT_RECHARGE_INTERVAL_MINUTES,
            default_energy_max: DEFAULT_ENERGY_MAX,
            user_page_size: 300,
            max_concurrent_recharges: 50,
            schedule: "every 10 minutes".to_string(),
            schedule_time_zone: "Asia/Seoul".to_string(),
            local_scheduler_enabled: false,
            push_notifications_enabled: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let gcp_project_id =
            env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string());
        let scheduler_service_account = env::var("SCHEDULER_SERVICE_ACCOUNT").unwrap_or_else(|_| {
            format!("energy-scheduler@{}.iam.gserviceaccount.com", gcp_project_id)
        });

        let config = Self {
            port: parse_var("PORT", 8080)?,
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            scheduler_service_account,
            recharge_interval_minutes: parse_var(
                "RECHARGE_INTERVAL_MINUTES",
                DEFAULT_RECHARGE_INTERVAL_MINUTES,
            )?,
            default_energy_max: parse_var("DEFAULT_ENERGY_MAX", DEFAULT_ENERGY_MAX)?,
            user_page_size: parse_var("USER_PAGE_SIZE", 300)?,
            max_concurrent_recharges: parse_var("MAX_CONCURRENT_RECHARGES", 50)?,
            schedule: env::var("SCHEDULE").unwrap_or_else(|_| "every 10 minutes".to_string()),
            schedule_time_zone: env::var("SCHEDULE_TIME_ZONE")
                .unwrap_or_else(|_| "Asia/Seoul".to_string()),
            local_scheduler_enabled: parse_var("LOCAL_SCHEDULER_ENABLED", false)?,
            push_notifications_enabled: parse_var("PUSH_NOTIFICATIONS_ENABLED", true)?,
            gcp_project_id,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.recharge_interval_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "RECHARGE_INTERVAL_MINUTES",
                reason: "must be positive".to_string(),
            });
        }
        if self.user_page_size == 0 {
            return Err(ConfigError::Invalid {
                name: "USER_PAGE_SIZE",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_concurrent_recharges == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_CONCURRENT_RECHARGES",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
