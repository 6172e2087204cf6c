// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Energy auto-recharge.
//!
//! Each run scans every user and, per user:
//! 1. Skips users already at capacity
//! 2. Counts whole recharge intervals elapsed since `energy_last_refill`
//! 3. Adds them (capped at capacity) and advances the refill time by exactly
//!    the intervals consumed, keeping the partial interval for the next run
//! 4. Commits the new state together with an `auto_recharge` transaction
//! 5. Sends a push notification when the user just reached capacity

use crate::config::Config;
use crate::db::EnergyStore;
use crate::error::{AppError, Result};
use crate::models::{EnergyPatch, EnergyTransaction, UserEnergy};
use crate::services::notifier::{Notifier, PushNotification};
use crate::time_utils::{elapsed_millis, format_utc_rfc3339};
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;

/// Capacity used when a user record has no `energy_max`.
pub const DEFAULT_ENERGY_MAX: i64 = 7;

/// Minutes per energy point.
pub const DEFAULT_RECHARGE_INTERVAL_MINUTES: i64 = 10;

/// How energy accumulates over time.
#[derive(Debug, Clone, Copy)]
pub struct RechargePolicy {
    pub interval: Duration,
    pub default_energy_max: i64,
}

impl Default for RechargePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(DEFAULT_RECHARGE_INTERVAL_MINUTES),
            default_energy_max: DEFAULT_ENERGY_MAX,
        }
    }
}

/// A recharge to apply to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recharge {
    /// Whole intervals elapsed, including any beyond capacity
    pub gained: i64,
    pub new_energy: i64,
    pub new_refill_time: DateTime<Utc>,
    pub reached_max: bool,
}

/// Outcome of evaluating one user against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RechargeDecision {
    /// Energy is already at or above capacity.
    AtCapacity,
    /// Less than one full interval has elapsed.
    NotDue,
    Recharge(Recharge),
}

impl RechargePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::minutes(config.recharge_interval_minutes),
            default_energy_max: config.default_energy_max,
        }
    }

    /// Decide what a run at `now` does to `user`.
    ///
    /// Missing fields default to `energy = 0`, `energy_max = default_energy_max`
    /// and `energy_last_refill = now`. Stored negative energy counts as zero.
    pub fn evaluate(&self, user: &UserEnergy, now: DateTime<Utc>) -> RechargeDecision {
        let energy = user.energy.unwrap_or(0).max(0);
        let energy_max = user.energy_max.unwrap_or(self.default_energy_max);
        let last_refill = user.energy_last_refill.unwrap_or(now);

        if energy >= energy_max {
            return RechargeDecision::AtCapacity;
        }

        let interval_ms = self.interval.num_milliseconds();
        let elapsed_ms = elapsed_millis(last_refill, now);
        if interval_ms <= 0 || elapsed_ms < interval_ms {
            return RechargeDecision::NotDue;
        }

        let gained = elapsed_ms / interval_ms;
        let new_energy = energy.saturating_add(gained).min(energy_max);
        let new_refill_time = last_refill + Duration::milliseconds(gained * interval_ms);

        RechargeDecision::Recharge(Recharge {
            gained,
            new_energy,
            new_refill_time,
            reached_max: new_energy == energy_max,
        })
    }
}

/// What happened to one user during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    AtCapacity,
    NotDue,
    Recharged { gained: i64, notify: NotifyOutcome },
    /// The user changed between read and write; retried next run.
    Conflict,
    WriteFailed,
    ReadFailed,
}

/// Push notification result for a recharged user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Still below capacity
    NotNeeded,
    /// Reached capacity but has no push token
    NoToken,
    Sent,
    Failed,
}

/// Summary of one run, returned to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RechargeReport {
    pub executed_at: String,
    pub scanned: u64,
    pub recharged: u64,
    pub at_capacity: u64,
    pub not_due: u64,
    pub energy_granted: i64,
    pub notified: u64,
    pub notification_failures: u64,
    pub conflicts: u64,
    pub write_failures: u64,
    pub read_failures: u64,
}

impl RechargeReport {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            executed_at: format_utc_rfc3339(now),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: UserOutcome) {
        self.scanned += 1;
        match outcome {
            UserOutcome::AtCapacity => self.at_capacity += 1,
            UserOutcome::NotDue => self.not_due += 1,
            UserOutcome::Recharged { gained, notify } => {
                self.recharged += 1;
                self.energy_granted += gained;
                match notify {
                    NotifyOutcome::Sent => self.notified += 1,
                    NotifyOutcome::Failed => self.notification_failures += 1,
                    NotifyOutcome::NotNeeded | NotifyOutcome::NoToken => {}
                }
            }
            UserOutcome::Conflict => self.conflicts += 1,
            UserOutcome::WriteFailed => self.write_failures += 1,
            UserOutcome::ReadFailed => self.read_failures += 1,
        }
    }
}

/// Runs the recharge job against injected storage and push clients.
pub struct EnergyRecharger {
    store: Arc<dyn EnergyStore>,
    notifier: Arc<dyn Notifier>,
    policy: RechargePolicy,
    page_size: u32,
    max_concurrency: usize,
}

impl EnergyRecharger {
    pub fn new(
        store: Arc<dyn EnergyStore>,
        notifier: Arc<dyn Notifier>,
        policy: RechargePolicy,
        page_size: u32,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            page_size: page_size.max(1),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_config(
        store: Arc<dyn EnergyStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self::new(
            store,
            notifier,
            RechargePolicy::from_config(config),
            config.user_page_size,
            config.max_concurrent_recharges,
        )
    }

    pub fn policy(&self) -> &RechargePolicy {
        &self.policy
    }

    /// Run one recharge pass over every user as of `now`.
    ///
    /// Per-user failures are logged and counted; only failing to open the
    /// user scan fails the run.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RechargeReport> {
        let users = self.store.stream_users(self.page_size).await?;

        let report = users
            .map(|user| async move {
                match user {
                    Ok(user) => self.process_user(user, now).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read user record");
                        UserOutcome::ReadFailed
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .fold(RechargeReport::new(now), |mut report, outcome| async move {
                report.record(outcome);
                report
            })
            .await;

        tracing::info!(
            executed_at = %report.executed_at,
            scanned = report.scanned,
            recharged = report.recharged,
            energy_granted = report.energy_granted,
            notified = report.notified,
            conflicts = report.conflicts,
            write_failures = report.write_failures,
            notification_failures = report.notification_failures,
            read_failures = report.read_failures,
            "Energy auto recharge executed"
        );

        Ok(report)
    }

    async fn process_user(&self, user: UserEnergy, now: DateTime<Utc>) -> UserOutcome {
        let recharge = match self.policy.evaluate(&user, now) {
            RechargeDecision::AtCapacity => return UserOutcome::AtCapacity,
            RechargeDecision::NotDue => return UserOutcome::NotDue,
            RechargeDecision::Recharge(recharge) => recharge,
        };

        let patch = EnergyPatch {
            energy: recharge.new_energy,
            energy_last_refill: recharge.new_refill_time,
        };
        let transaction = EnergyTransaction::auto_recharge(recharge.gained, now);

        match self
            .store
            .apply_recharge(&user, &patch, &transaction)
            .await
        {
            Ok(()) => {}
            Err(AppError::Conflict(reason)) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    reason = %reason,
                    "User changed during recharge, leaving for next run"
                );
                return UserOutcome::Conflict;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user.user_id,
                    error = %e,
                    "Failed to write recharge"
                );
                return UserOutcome::WriteFailed;
            }
        }

        tracing::info!(
            user_id = %user.user_id,
            gained = recharge.gained,
            new_energy = recharge.new_energy,
            "Energy recharged"
        );

        let notify = self.notify_if_full(&user, &recharge).await;

        UserOutcome::Recharged {
            gained: recharge.gained,
            notify,
        }
    }

    /// Push notification is best effort: the recharge is already committed.
    async fn notify_if_full(&self, user: &UserEnergy, recharge: &Recharge) -> NotifyOutcome {
        if !recharge.reached_max {
            return NotifyOutcome::NotNeeded;
        }

        let Some(token) = user.push_token() else {
            tracing::debug!(user_id = %user.user_id, "Energy full but no push token");
            return NotifyOutcome::NoToken;
        };

        match self
            .notifier
            .send(token, &PushNotification::energy_full())
            .await
        {
            Ok(()) => NotifyOutcome::Sent,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    error = %e,
                    "Failed to send energy-full notification"
                );
                NotifyOutcome::Failed
            }
        }
    }
}
