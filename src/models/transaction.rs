// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Append-only energy audit records.
//!
//! Stored at: `users/{user_id}/energy_transactions/{transaction_id}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What produced an energy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    AutoRecharge,
}

/// One energy change, never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Energy points gained (before capping)
    pub amount: i64,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl EnergyTransaction {
    pub fn auto_recharge(amount: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: TransactionKind::AutoRecharge,
            amount,
            created_at,
        }
    }
}

/// Document ID for the audit record of a recharge.
///
/// Keyed by the refill time the recharge advanced to, so a retried write of
/// the same recharge overwrites its own record instead of adding a second one.
pub fn recharge_transaction_id(new_refill_time: DateTime<Utc>) -> String {
    format!("auto_recharge_{}", new_refill_time.timestamp_millis())
}
