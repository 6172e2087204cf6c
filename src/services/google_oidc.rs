// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OIDC token verification for Cloud Scheduler invocations.
//!
//! Cloud Scheduler signs each HTTP invocation with an ID token for the
//! scheduler service account. Tokens are checked against Google's published
//! signing keys, which are cached for as long as `Cache-Control` allows.

use crate::config::Config;
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Caller identity taken from a verified token.
#[derive(Debug, Clone)]
pub struct VerifiedPrincipal {
    pub email: String,
    pub subject: String,
}

/// OIDC verification error categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// The token is missing/invalid or claims do not match expectations.
    Forbidden(String),
    /// Signing keys could not be fetched (safe for the scheduler to retry).
    Transient(String),
}

enum KeySource {
    Google {
        http_client: reqwest::Client,
        cache: RwLock<Option<CachedKeys>>,
        refresh_lock: Mutex<()>,
    },
    Static {
        kid: String,
        key: Arc<DecodingKey>,
    },
}

struct CachedKeys {
    by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for scheduler-issued OIDC ID tokens.
pub struct SchedulerTokenVerifier {
    audience: String,
    service_account: String,
    keys: KeySource,
}

impl SchedulerTokenVerifier {
    /// Production verifier using Google's published signing keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let verifier = Self {
            audience: canonicalize_audience(&config.api_url),
            service_account: config.scheduler_service_account.clone(),
            keys: KeySource::Google {
                http_client,
                cache: RwLock::new(None),
                refresh_lock: Mutex::new(()),
            },
        };

        tracing::info!(
            audience = %verifier.audience,
            service_account = %verifier.service_account,
            "Initialized scheduler OIDC verifier"
        );

        Ok(verifier)
    }

    /// Verifier that trusts a single RSA key, for tests.
    pub fn with_static_key(
        config: &Config,
        kid: impl Into<String>,
        key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static OIDC kid must not be empty");
        }

        Ok(Self {
            audience: canonicalize_audience(&config.api_url),
            service_account: config.scheduler_service_account.clone(),
            keys: KeySource::Static {
                kid,
                key: Arc::new(key),
            },
        })
    }

    /// Verify the bearer token in an `Authorization` header.
    pub async fn verify(
        &self,
        auth_header: Option<&HeaderValue>,
    ) -> Result<VerifiedPrincipal, OidcError> {
        let token = extract_bearer_token(auth_header)?;

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, key.as_ref(), &validation)
            .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        check_claims(&claims, &self.service_account)?;

        Ok(VerifiedPrincipal {
            email: claims.email.unwrap_or_default(),
            subject: claims.sub,
        })
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        let (http_client, cache, refresh_lock) = match &self.keys {
            KeySource::Static { kid: known, key } if known == kid => return Ok(key.clone()),
            KeySource::Static { .. } => {
                return Err(OidcError::Forbidden(format!("unknown JWT kid: {kid}")));
            }
            KeySource::Google {
                http_client,
                cache,
                refresh_lock,
            } => (http_client, cache, refresh_lock),
        };

        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }

        // Google rotates keys; an unknown kid forces one refetch.
        let _guard = refresh_lock.lock().await;
        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }

        let fresh = fetch_google_keys(http_client).await?;
        let key = fresh.by_kid.get(kid).cloned();
        *cache.write().await = Some(fresh);

        key.ok_or_else(|| OidcError::Forbidden(format!("JWT kid not found in JWKS: {kid}")))
    }
}

async fn cached_key(cache: &RwLock<Option<CachedKeys>>, kid: &str) -> Option<Arc<DecodingKey>> {
    let now = Instant::now();
    cache
        .read()
        .await
        .as_ref()
        .filter(|entry| entry.expires_at > now)
        .and_then(|entry| entry.by_kid.get(kid).cloned())
}

async fn fetch_google_keys(http_client: &reqwest::Client) -> Result<CachedKeys, OidcError> {
    let response = http_client
        .get(GOOGLE_JWKS_URL)
        .send()
        .await
        .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(OidcError::Transient(format!(
            "JWKS request returned status {}",
            response.status()
        )));
    }

    let ttl = response
        .headers()
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_KEYS_TTL);

    let jwks: Jwks = response
        .json()
        .await
        .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

    let by_kid: HashMap<_, _> = jwks
        .keys
        .into_iter()
        .filter(Jwk::is_rs256_signing_key)
        .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => Some((jwk.kid, Arc::new(key))),
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                None
            }
        })
        .collect();

    if by_kid.is_empty() {
        return Err(OidcError::Transient(
            "JWKS response did not include any usable RSA keys".to_string(),
        ));
    }

    tracing::debug!(keys = by_kid.len(), ttl_secs = ttl.as_secs(), "Google JWKS refreshed");

    Ok(CachedKeys {
        by_kid,
        expires_at: Instant::now() + ttl,
    })
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

impl Jwk {
    fn is_rs256_signing_key(&self) -> bool {
        self.kty == "RSA"
            && !self.kid.trim().is_empty()
            && self.alg.as_deref().map_or(true, |alg| alg == "RS256")
            && self.use_.as_deref().map_or(true, |use_| use_ == "sig")
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
}

/// Claims `jsonwebtoken` does not validate on its own.
fn check_claims(claims: &IdTokenClaims, service_account: &str) -> Result<(), OidcError> {
    match claims.iat {
        None => return Err(OidcError::Forbidden("missing iat claim".to_string())),
        Some(iat) if iat > now_unix_secs() + CLOCK_SKEW_SECS => {
            return Err(OidcError::Forbidden(
                "iat claim is in the future".to_string(),
            ));
        }
        Some(_) => {}
    }

    match claims.email.as_deref() {
        None => return Err(OidcError::Forbidden("missing email claim".to_string())),
        Some(email) if email != service_account => {
            return Err(OidcError::Forbidden(format!(
                "unexpected service account email: {email}"
            )));
        }
        Some(_) => {}
    }

    if claims.email_verified != Some(true) {
        return Err(OidcError::Forbidden(
            "email_verified claim is not true".to_string(),
        ));
    }

    Ok(())
}

fn extract_bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, OidcError> {
    let value = auth_header
        .ok_or_else(|| OidcError::Forbidden("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| OidcError::Forbidden("invalid Authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        Some(_) => Err(OidcError::Forbidden("Bearer token is empty".to_string())),
        None => Err(OidcError::Forbidden(
            "Authorization header must be Bearer token".to_string(),
        )),
    }
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse().ok())
}

fn canonicalize_audience(audience: &str) -> String {
    audience.trim_end_matches('/').to_string()
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
