//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use crate::error::Result;
use crate::models::{EnergyPatch, EnergyTransaction, UserEnergy};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Per-user audit trail, child of `users/{user_id}`
    pub const ENERGY_TRANSACTIONS: &str = "energy_transactions";
}

/// Storage operations the recharge job depends on.
#[async_trait]
pub trait EnergyStore: Send + Sync {
    /// Lazily stream every user record, fetching `page_size` documents per
    /// round trip. A failed item does not end the stream.
    async fn stream_users<'a>(
        &'a self,
        page_size: u32,
    ) -> Result<BoxStream<'a, Result<UserEnergy>>>;

    /// Write `patch` to the user and append `transaction` in one commit.
    ///
    /// The write only succeeds if the user document is unchanged since
    /// `user` was read; otherwise `AppError::Conflict` is returned.
    async fn apply_recharge(
        &self,
        user: &UserEnergy,
        patch: &EnergyPatch,
        transaction: &EnergyTransaction,
    ) -> Result<()>;
}
