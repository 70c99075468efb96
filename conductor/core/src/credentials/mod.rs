//! Credential Broker
//!
//! Providers that require a short-lived API token get it from a
//! [`TokenBroker`]. The broker caches one token per principal for a fixed
//! TTL and collapses concurrent cache misses into a single upstream
//! issuance.
//!
//! # Design
//!
//! - The broker is an owned instance shared by `Arc`; there is no global
//!   cache.
//! - Cache and in-flight issuances live under one `parking_lot::Mutex`
//!   which is never held across an `.await`.
//! - An in-flight issuance is a `futures::future::Shared` future. Every
//!   waiter polls the same future and receives a clone of its result.
//! - Failures are not cached. Every waiter of the failed issuance receives
//!   the same [`GenerationError::TokenIssuance`], and the next call retries
//!   upstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::GenerationError;

/// Upstream source of provider tokens
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issue a fresh token for `principal`
    async fn issue(&self, principal: &str, limit: Option<u32>) -> Result<String, GenerationError>;
}

/// A cached provider token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    /// Principal the token was issued for
    pub principal: String,
    /// Opaque token value
    pub token: String,
    /// Instant after which the token is no longer served
    pub expires_at: Instant,
}

impl Credential {
    /// Whether the token may still be served at `now`
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type Issuance = Shared<BoxFuture<'static, Result<Credential, GenerationError>>>;

#[derive(Default)]
struct BrokerState {
    cache: HashMap<String, Credential>,
    inflight: HashMap<String, Issuance>,
}

/// TTL cache with single-flight issuance
pub struct TokenBroker {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<Mutex<BrokerState>>,
}

impl TokenBroker {
    /// Create a broker caching tokens for `ttl`
    pub fn new(issuer: Arc<dyn TokenIssuer>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            issuer,
            clock,
            ttl,
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Token for `principal`, issued upstream only on a cache miss
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::TokenIssuance`] when the upstream issuance
    /// fails. Concurrent callers waiting on the same issuance all receive
    /// the same error.
    pub async fn get_token(
        &self,
        principal: &str,
        limit: Option<u32>,
    ) -> Result<String, GenerationError> {
        let issuance = {
            let mut state = self.state.lock();
            let now = self.clock.now();

            match state.cache.get(principal) {
                Some(credential) if credential.is_valid_at(now) => {
                    tracing::trace!(principal, "Token cache hit");
                    return Ok(credential.token.clone());
                }
                Some(_) => {
                    tracing::debug!(principal, "Evicting expired token");
                    state.cache.remove(principal);
                }
                None => {}
            }

            if let Some(pending) = state.inflight.get(principal) {
                tracing::debug!(principal, "Joining in-flight token issuance");
                pending.clone()
            } else {
                let issuance = self.issue(principal.to_string(), limit);
                state
                    .inflight
                    .insert(principal.to_string(), issuance.clone());
                issuance
            }
        };

        issuance.await.map(|credential| credential.token)
    }

    /// Drop the cached token for `principal`
    pub fn invalidate(&self, principal: &str) {
        if self.state.lock().cache.remove(principal).is_some() {
            tracing::debug!(principal, "Token invalidated");
        }
    }

    /// Number of principals with a cached token (expired entries included)
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Build the shared issuance future for one principal
    fn issue(&self, principal: String, limit: Option<u32>) -> Issuance {
        let issuer = Arc::clone(&self.issuer);
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;

        async move {
            tracing::info!(principal = %principal, "Issuing provider token");
            let result = issuer
                .issue(&principal, limit)
                .await
                .map(|token| Credential {
                    principal: principal.clone(),
                    token,
                    expires_at: clock.now() + ttl,
                })
                .map_err(|e| e.into_token_issuance(&principal));

            {
                let mut state = state.lock();
                state.inflight.remove(&principal);
                match &result {
                    Ok(credential) => {
                        state.cache.insert(principal.clone(), credential.clone());
                    }
                    Err(e) => {
                        tracing::warn!(principal = %principal, error = %e, "Token issuance failed");
                    }
                }
            }

            result
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("ttl", &self.ttl)
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}
