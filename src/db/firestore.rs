// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (energy fields only, paged scans)
//! - Energy transactions (append-only audit sub-collection)

use crate::db::{collections, EnergyStore};
use crate::error::AppError;
use crate::models::recharge_transaction_id;
use crate::models::{EnergyPatch, EnergyTransaction, UserEnergy};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{paths, FirestoreWritePrecondition};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // The emulator accepts any bearer token; an unsigned JWT keeps the SDK
        // from looking for local credentials.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Get the underlying client or return an error if offline.
    pub fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get the energy fields of a single user.
    pub async fn get_user_energy(&self, user_id: &str) -> Result<Option<UserEnergy>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Energy Transaction Operations ───────────────────────────

    /// List a user's energy transactions, newest first.
    pub async fn list_energy_transactions(
        &self,
        user_id: &str,
    ) -> Result<Vec<EnergyTransaction>, AppError> {
        let client = self.get_client()?;
        let parent_path = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .select()
            .from(collections::ENERGY_TRANSACTIONS)
            .parent(&parent_path)
            .order_by([(
                "created_at",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl EnergyStore for FirestoreDb {
    async fn stream_users<'a>(
        &'a self,
        page_size: u32,
    ) -> Result<BoxStream<'a, Result<UserEnergy, AppError>>, AppError> {
        let users = self
            .get_client()?
            .fluent()
            .list()
            .from(collections::USERS)
            .page_size(page_size as usize)
            .obj::<UserEnergy>()
            .stream_all_with_errors()
            .await
            .map_err(|e| AppError::Database(format!("Failed to list users: {}", e)))?;

        Ok(users
            .map(|user| user.map_err(|e| AppError::Database(e.to_string())))
            .boxed())
    }

    /// Commit the energy update and its audit record atomically.
    ///
    /// The user update carries a precondition on the update time seen by the
    /// scan, so a concurrent spend between read and write makes the whole
    /// commit fail instead of being overwritten.
    async fn apply_recharge(
        &self,
        user: &UserEnergy,
        patch: &EnergyPatch,
        transaction: &EnergyTransaction,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;
        let user_id = user.user_id.as_str();

        let parent_path = client
            .parent_path(collections::USERS, user_id)
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Never create a user document that was deleted after the scan.
        let precondition = match user.update_time {
            Some(update_time) => FirestoreWritePrecondition::UpdateTime(update_time),
            None => FirestoreWritePrecondition::Exists(true),
        };

        let mut db_transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .fields(paths!(EnergyPatch::{energy, energy_last_refill}))
            .in_col(collections::USERS)
            .precondition(precondition)
            .document_id(user_id)
            .object(patch)
            .add_to_transaction(&mut db_transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add energy update to transaction: {}", e))
            })?;

        // Audit records are append-only.
        client
            .fluent()
            .update()
            .in_col(collections::ENERGY_TRANSACTIONS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(recharge_transaction_id(patch.energy_last_refill))
            .parent(&parent_path)
            .object(transaction)
            .add_to_transaction(&mut db_transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add energy transaction to transaction: {}",
                    e
                ))
            })?;

        db_transaction
            .commit()
            .await
            .map_err(|e| commit_error(user_id, e))?;

        tracing::debug!(
            user_id,
            energy = patch.energy,
            amount = transaction.amount,
            "Recharge committed"
        );

        Ok(())
    }
}

/// Classify a failed commit: lost preconditions are conflicts, the rest are
/// database errors.
fn commit_error(user_id: &str, err: FirestoreError) -> AppError {
    if is_lost_precondition(&err) {
        AppError::Conflict(format!("user {} changed during recharge: {}", user_id, err))
    } else {
        AppError::Database(format!("Transaction commit failed: {}", err))
    }
}

/// A stale `UpdateTime` comes back as `FailedPrecondition`; an audit record
/// that already exists comes back as a data conflict.
fn is_lost_precondition(err: &FirestoreError) -> bool {
    match err {
        FirestoreError::DataConflictError(_) | FirestoreError::DataNotFoundError(_) => true,
        FirestoreError::DatabaseError(e) => e.public.code == "FailedPrecondition",
        _ => false,
    }
}
