// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process recharge ticker for local development.
//!
//! In production Cloud Scheduler calls `/tasks/energy-recharge`. Against the
//! Firestore emulator there is no scheduler, so the process can drive the
//! job itself.

use crate::services::recharge::EnergyRecharger;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run the recharge job every `period` until the task is aborted.
///
/// The first run happens immediately. A run that overlaps the next tick
/// delays it rather than stacking runs.
pub fn spawn_local_ticker(recharger: Arc<EnergyRecharger>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs(), "Starting local recharge ticker");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = recharger.run(chrono::Utc::now()).await {
                tracing::warn!(error = %e, "Recharge run failed, will retry next tick");
            }
        }
    })
}
