// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (scheduler authentication).

pub mod scheduler_auth;

pub use scheduler_auth::require_scheduler_auth;
