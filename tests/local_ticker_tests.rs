// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

mod common;

use chrono::Utc;
use common::{recharger, FakeNotifier, FakeStore};
use energy_recharge::models::UserEnergy;
use energy_recharge::services::spawn_local_ticker;
use std::sync::Arc;
use std::time::Duration;

const PERIOD: Duration = Duration::from_secs(600);

// The tokio clock is paused: sleeps advance virtual time as soon as every
// task is idle, so tick counts are exact.
#[tokio::test(start_paused = true)]
async fn ticker_runs_immediately_and_every_period() {
    let store = FakeStore::with_users([UserEnergy {
        user_id: "u1".to_string(),
        energy: Some(0),
        energy_max: Some(7),
        energy_last_refill: Some(Utc::now() - chrono::Duration::minutes(30)),
        fcm_token: None,
        update_time: Some(Utc::now() - chrono::Duration::days(1)),
    }]);
    let job = Arc::new(recharger(store.clone(), FakeNotifier::new()));

    let handle = spawn_local_ticker(job, PERIOD);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(store.scan_count(), 1);
    assert_eq!(store.user("u1").energy, Some(3));

    tokio::time::sleep(PERIOD * 2).await;
    assert_eq!(store.scan_count(), 3);

    // Later ticks find nothing new to grant within the same interval.
    assert_eq!(store.transaction_count(), 1);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn ticker_survives_failed_runs() {
    let store = FakeStore::with_users(Vec::new());
    store.make_unavailable();
    let job = Arc::new(recharger(store.clone(), FakeNotifier::new()));

    let handle = spawn_local_ticker(job, PERIOD);
    tokio::time::sleep(PERIOD * 5 + Duration::from_millis(1)).await;

    assert!(!handle.is_finished());
    assert_eq!(store.scan_count(), 6);
    handle.abort();
}
