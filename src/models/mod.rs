// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod transaction;
pub mod user;

pub use transaction::{recharge_transaction_id, EnergyTransaction, TransactionKind};
pub use user::{EnergyPatch, UserEnergy};
