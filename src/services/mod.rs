// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod google_oidc;
pub mod notifier;
pub mod recharge;
pub mod ticker;

pub use google_oidc::{OidcError, SchedulerTokenVerifier, VerifiedPrincipal};
pub use notifier::{FcmNotifier, LogNotifier, Notifier, PushNotification};
pub use recharge::{EnergyRecharger, RechargePolicy, RechargeReport};
pub use ticker::spawn_local_ticker;
