// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use energy_recharge::config::Config;
use energy_recharge::db::{EnergyStore, FirestoreDb};
use energy_recharge::error::{AppError, Result};
use energy_recharge::models::{EnergyPatch, EnergyTransaction, UserEnergy};
use energy_recharge::routes::create_router;
use energy_recharge::services::{
    EnergyRecharger, Notifier, PushNotification, RechargePolicy, SchedulerTokenVerifier,
};
use energy_recharge::AppState;
use futures_util::stream::{self, BoxStream, StreamExt};
use jsonwebtoken::{DecodingKey, EncodingKey, Header};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_KID: &str = "scheduler-test-kid";
const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/scheduler_test_key.pem");
const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/scheduler_test_key.pub.pem");

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Fixed invocation time for deterministic tests.
pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// User record with a refill `minutes_ago` before `test_now()`.
pub fn user(
    user_id: &str,
    energy: i64,
    energy_max: i64,
    minutes_ago: i64,
    fcm_token: Option<&str>,
) -> UserEnergy {
    UserEnergy {
        user_id: user_id.to_string(),
        energy: Some(energy),
        energy_max: Some(energy_max),
        energy_last_refill: Some(test_now() - Duration::minutes(minutes_ago)),
        fcm_token: fcm_token.map(str::to_string),
        update_time: Some(test_now() - Duration::days(1)),
    }
}

// ─── In-memory store ─────────────────────────────────────────────

/// In-memory `EnergyStore` with failure injection.
#[derive(Default)]
pub struct FakeStore {
    users: Mutex<BTreeMap<String, UserEnergy>>,
    transactions: Mutex<Vec<(String, EnergyTransaction)>>,
    failing_writes: Mutex<HashSet<String>>,
    conflicting_writes: Mutex<HashSet<String>>,
    unreadable_records: AtomicU32,
    scan_unavailable: AtomicBool,
    last_page_size: AtomicU32,
    scans: AtomicU32,
    writes: AtomicU32,
}

impl FakeStore {
    pub fn with_users(users: impl IntoIterator<Item = UserEnergy>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.users.lock().unwrap();
            for user in users {
                map.insert(user.user_id.clone(), user);
            }
        }
        Arc::new(store)
    }

    pub fn user(&self, user_id: &str) -> UserEnergy {
        self.users.lock().unwrap()[user_id].clone()
    }

    pub fn transactions_for(&self, user_id: &str) -> Vec<EnergyTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == user_id)
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }

    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn scan_count(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn last_page_size(&self) -> u32 {
        self.last_page_size.load(Ordering::SeqCst)
    }

    pub fn fail_writes_for(&self, user_id: &str) {
        self.failing_writes
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    /// Simulate a concurrent writer touching `user_id` after the scan.
    pub fn conflict_writes_for(&self, user_id: &str) {
        self.conflicting_writes
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn add_unreadable_records(&self, count: u32) {
        self.unreadable_records.fetch_add(count, Ordering::SeqCst);
    }

    pub fn make_unavailable(&self) {
        self.scan_unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EnergyStore for FakeStore {
    async fn stream_users<'a>(
        &'a self,
        page_size: u32,
    ) -> Result<BoxStream<'a, Result<UserEnergy>>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.scan_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("store unreachable".to_string()));
        }
        self.last_page_size.store(page_size, Ordering::SeqCst);

        let mut items: Vec<Result<UserEnergy>> = self
            .users
            .lock()
            .unwrap()
            .values()
            .cloned()
            .map(Ok)
            .collect();
        for _ in 0..self.unreadable_records.load(Ordering::SeqCst) {
            items.push(Err(AppError::Database(
                "invalid type: string, expected i64".to_string(),
            )));
        }

        Ok(stream::iter(items).boxed())
    }

    async fn apply_recharge(
        &self,
        user: &UserEnergy,
        patch: &EnergyPatch,
        transaction: &EnergyTransaction,
    ) -> Result<()> {
        if self.conflicting_writes.lock().unwrap().contains(&user.user_id) {
            return Err(AppError::Conflict(format!(
                "user {} changed during recharge",
                user.user_id
            )));
        }
        if self.failing_writes.lock().unwrap().contains(&user.user_id) {
            return Err(AppError::Database("deadline exceeded".to_string()));
        }

        let mut users = self.users.lock().unwrap();
        let stored = users
            .get_mut(&user.user_id)
            .ok_or_else(|| AppError::Conflict(format!("user {} deleted", user.user_id)))?;
        if stored.update_time != user.update_time {
            return Err(AppError::Conflict(format!(
                "user {} update time moved",
                user.user_id
            )));
        }

        stored.energy = Some(patch.energy);
        stored.energy_last_refill = Some(patch.energy_last_refill);
        stored.update_time = Some(stored.update_time.unwrap_or_default() + Duration::milliseconds(1));

        self.transactions
            .lock()
            .unwrap()
            .push((user.user_id.clone(), transaction.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Recording notifier ──────────────────────────────────────────

/// Notifier that records deliveries, optionally failing them.
#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(String, PushNotification)>>,
    failing: AtomicBool,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        Arc::new(notifier)
    }

    pub fn sent(&self) -> Vec<(String, PushNotification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.sent().into_iter().map(|(token, _)| token).collect();
        tokens.sort();
        tokens
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Notification(
                "FCM returned 404 Not Found: UNREGISTERED".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((device_token.to_string(), notification.clone()));
        Ok(())
    }
}

/// Recharger with default policy over the given fakes.
pub fn recharger(store: Arc<FakeStore>, notifier: Arc<FakeNotifier>) -> EnergyRecharger {
    EnergyRecharger::new(store, notifier, RechargePolicy::default(), 100, 8)
}

// ─── App and tokens ──────────────────────────────────────────────

/// Create a test app over in-memory fakes.
/// Returns the router and the shared state.
pub fn create_test_app(
    store: Arc<FakeStore>,
    notifier: Arc<FakeNotifier>,
) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let recharger = Arc::new(EnergyRecharger::from_config(store, notifier, &config));

    let decoding_key =
        DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).expect("test public key");
    let oidc_verifier = Arc::new(
        SchedulerTokenVerifier::with_static_key(&config, TEST_KID, decoding_key)
            .expect("static verifier"),
    );

    let state = Arc::new(AppState {
        config,
        recharger,
        oidc_verifier,
    });

    (create_router(state.clone()), state)
}

/// Claims overrides for scheduler tokens.
pub struct TokenClaims {
    pub email: String,
    pub audience: String,
    pub email_verified: bool,
}

impl TokenClaims {
    pub fn valid(config: &Config) -> Self {
        Self {
            email: config.scheduler_service_account.clone(),
            audience: config.api_url.clone(),
            email_verified: true,
        }
    }
}

/// Sign a scheduler OIDC token with the test key.
pub fn create_scheduler_jwt(claims: &TokenClaims) -> String {
    let now = Utc::now().timestamp();
    let body = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": claims.audience,
        "sub": "109876543210987654321",
        "email": claims.email,
        "email_verified": claims.email_verified,
        "iat": now,
        "exp": now + 3600,
    });

    let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());

    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).expect("test private key");
    jsonwebtoken::encode(&header, &body, &key).expect("sign test token")
}
