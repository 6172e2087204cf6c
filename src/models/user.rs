//! User energy fields as stored on `users/{user_id}`.
//!
//! User documents are owned by account management. This service only reads
//! the energy fields below and writes back `energy` and `energy_last_refill`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Energy-related view of a user document.
///
/// Every stored field is optional; defaults are applied by the recharge
/// policy, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserEnergy {
    /// Firestore document ID
    #[serde(rename = "_firestore_id", default, skip_serializing)]
    pub user_id: String,
    /// Current energy level
    #[serde(default)]
    pub energy: Option<i64>,
    /// Per-user capacity
    #[serde(default)]
    pub energy_max: Option<i64>,
    /// Point in time the next increment is measured from
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub energy_last_refill: Option<DateTime<Utc>>,
    /// Push destination for this user's device
    #[serde(default)]
    pub fcm_token: Option<String>,
    /// Document update time observed when the record was read
    #[serde(
        rename = "_firestore_updated",
        default,
        skip_serializing,
        with = "firestore::serialize_as_optional_timestamp"
    )]
    pub update_time: Option<DateTime<Utc>>,
}

impl UserEnergy {
    /// Push token, treating an empty string as absent.
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|token| !token.is_empty())
    }
}

/// Fields written back by a recharge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPatch {
    pub energy: i64,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub energy_last_refill: DateTime<Utc>,
}
