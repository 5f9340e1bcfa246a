//! Credential session management.
//!
//! [`AuthManager`] turns a domain's long-lived API key into the
//! `Authorization` header for the next outbound request. Depending on the
//! declared scopes it either sends the key as-is or exchanges it for a
//! short-lived access token, which it caches, refreshes before expiry, and
//! regenerates once the refresh token is spent.
//!
//! # Header selection
//!
//! | API key | Scopes            | Header                                   |
//! |---------|-------------------|------------------------------------------|
//! | none    | any               | *(no header)*                            |
//! | set     | `{ingestion}`     | `Authorization: <key>`                   |
//! | set     | anything else     | `Authorization: Bearer <access token>`   |
//! | set     | token unavailable | `Authorization: <key>` (fallback)        |
//!
//! # Concurrency
//!
//! At most one token exchange is in flight per manager. Callers that arrive
//! while one is running await the same shared result instead of starting a
//! second exchange. The exchange itself runs on a spawned task, so it
//! completes and clears the in-flight marker even if every caller gives up.

mod clock;
mod endpoint;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sift_common::{
    DEFAULT_ACCESS_TOKEN_LIFETIME_MS, DEFAULT_REFRESH_TOKEN_LIFETIME_MS, DomainConfig, ScopeSet,
};
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;

pub use clock::{Clock, SystemClock};
pub use endpoint::{
    API_KEY_HEADER, GeneratedTokens, HttpTokenEndpoint, RefreshedToken, TokenEndpoint,
    TokenRequest,
};

use crate::error::AuthError;

/// Access tokens are treated as expired this long before their real expiry.
pub const DEFAULT_EXPIRY_BUFFER_MS: u64 = 60_000;

type PendingToken = Shared<BoxFuture<'static, Result<SecretString, AuthError>>>;

/// Token lifetimes and scopes for one manager.
///
/// ```
/// use sift_client::auth::AuthOptions;
/// use sift_common::ScopeSet;
///
/// let options = AuthOptions::builder()
///     .scopes(ScopeSet::ingestion_only())
///     .access_token_lifetime_ms(3_600_000)
///     .build();
/// assert_eq!(options.refresh_token_lifetime_ms, 604_800_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct AuthOptions {
    /// Capabilities requested when generating tokens
    #[builder(default)]
    pub scopes: ScopeSet,
    #[builder(default = DEFAULT_ACCESS_TOKEN_LIFETIME_MS)]
    pub access_token_lifetime_ms: u64,
    #[builder(default = DEFAULT_REFRESH_TOKEN_LIFETIME_MS)]
    pub refresh_token_lifetime_ms: u64,
    /// Margin before access token expiry at which it is no longer handed out
    #[builder(default = DEFAULT_EXPIRY_BUFFER_MS)]
    pub expiry_buffer_ms: u64,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&DomainConfig> for AuthOptions {
    fn from(domain: &DomainConfig) -> Self {
        Self::builder()
            .scopes(domain.scopes.clone())
            .access_token_lifetime_ms(domain.access_token_lifetime_ms)
            .refresh_token_lifetime_ms(domain.refresh_token_lifetime_ms)
            .build()
    }
}

/// Snapshot of a manager's token state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub has_tokens: bool,
    pub access_token_valid: bool,
    pub refresh_token_valid: bool,
}

struct TokenPair {
    access_token: SecretString,
    refresh_token: SecretString,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
}

impl TokenPair {
    fn from_generated(tokens: GeneratedTokens, now: DateTime<Utc>) -> Self {
        let refresh_expires_at = add_ms(now, tokens.refresh_token_expiry);
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: add_ms(now, tokens.access_token_expiry).min(refresh_expires_at),
            refresh_expires_at,
        }
    }

    fn access_valid(&self, now: DateTime<Utc>, buffer_ms: u64) -> bool {
        now < sub_ms(self.access_expires_at, buffer_ms)
    }

    fn refresh_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_expires_at
    }
}

#[derive(Default)]
struct SessionState {
    tokens: Option<TokenPair>,
    in_flight: Option<PendingToken>,
}

enum Acquisition {
    Generate,
    Refresh(SecretString),
}

enum Exchanged {
    Generated(GeneratedTokens),
    Refreshed(SecretString),
}

struct Inner {
    label: String,
    api_key: Option<SecretString>,
    options: AuthOptions,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

/// Produces `Authorization` headers for one domain.
///
/// Cheap to clone; clones share the same token state.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("label", &self.inner.label)
            .field("api_key", &self.inner.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    /// Creates a manager using the wall clock.
    ///
    /// `label` only appears in log lines.
    pub fn new(
        label: impl Into<String>,
        api_key: Option<SecretString>,
        options: AuthOptions,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self::with_clock(label, api_key, options, endpoint, Arc::new(SystemClock))
    }

    /// Creates a manager with an explicit time source.
    pub fn with_clock(
        label: impl Into<String>,
        api_key: Option<SecretString>,
        options: AuthOptions,
        endpoint: Arc<dyn TokenEndpoint>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                api_key,
                options,
                endpoint,
                clock,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Creates a manager for a configured domain, talking to its token
    /// endpoint over `client`.
    pub fn for_domain(domain: &DomainConfig, client: ClientWithMiddleware) -> Self {
        Self::new(
            domain.id.clone(),
            domain.api_key.clone(),
            AuthOptions::from(domain),
            Arc::new(HttpTokenEndpoint::new(client, domain.auth_url.clone())),
        )
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.inner.api_key.is_some()
    }

    #[must_use]
    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    /// Returns the headers to merge into the next outbound request.
    ///
    /// Never fails: if a token cannot be obtained the raw API key is sent and
    /// the downstream API decides whether to accept it.
    pub async fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let Some(api_key) = &self.inner.api_key else {
            return headers;
        };

        let bearer = if self.inner.options.scopes.is_ingestion_only() {
            None
        } else {
            match self.access_token().await {
                Ok(token) => {
                    let bearer = sensitive_value(&format!("Bearer {}", token.expose_secret()));
                    if bearer.is_none() {
                        log::warn!(
                            "Access token for domain '{}' is not a valid header value, falling back to API key",
                            self.inner.label
                        );
                    }
                    bearer
                }
                Err(e) => {
                    log::warn!(
                        "Falling back to API key for domain '{}': {e}",
                        self.inner.label
                    );
                    None
                }
            }
        };

        match bearer.or_else(|| sensitive_value(api_key.expose_secret())) {
            Some(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            None => log::warn!(
                "API key for domain '{}' is not a valid header value, sending no Authorization header",
                self.inner.label
            ),
        }

        headers
    }

    /// Returns a valid access token, reusing, refreshing or generating one.
    ///
    /// # Errors
    ///
    /// Returns the failure of the generation or refresh exchange this call
    /// started or joined, or [`AuthError::MissingApiKey`] if there is nothing
    /// to exchange.
    pub async fn access_token(&self) -> Result<SecretString, AuthError> {
        let pending = {
            let mut state = self.inner.state.lock().await;

            if let Some(pending) = &state.in_flight {
                log::debug!(
                    "Joining in-flight token acquisition for domain '{}'",
                    self.inner.label
                );
                pending.clone()
            } else {
                let now = self.inner.clock.now();
                let acquisition = match &state.tokens {
                    Some(tokens) if tokens.access_valid(now, self.inner.options.expiry_buffer_ms) => {
                        return Ok(tokens.access_token.clone());
                    }
                    Some(tokens) if tokens.refresh_valid(now) => {
                        Acquisition::Refresh(tokens.refresh_token.clone())
                    }
                    _ => Acquisition::Generate,
                };
                self.start(&mut state, acquisition)
            }
        };

        pending.await
    }

    /// Drops the stored token pair so the next request generates a new one.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        if state.tokens.take().is_some() {
            log::info!("Cleared stored tokens for domain '{}'", self.inner.label);
        }
    }

    /// Reports whether tokens are stored and which are still usable.
    pub async fn status(&self) -> AuthStatus {
        let state = self.inner.state.lock().await;
        let now = self.inner.clock.now();

        state.tokens.as_ref().map_or(
            AuthStatus {
                has_tokens: false,
                access_token_valid: false,
                refresh_token_valid: false,
            },
            |tokens| AuthStatus {
                has_tokens: true,
                access_token_valid: tokens.access_valid(now, self.inner.options.expiry_buffer_ms),
                refresh_token_valid: tokens.refresh_valid(now),
            },
        )
    }

    /// Spawns an exchange and records it as the in-flight acquisition.
    ///
    /// Must be called with the state lock held and no acquisition in flight.
    /// The exchange runs in its own task under a supervisor, so the marker is
    /// cleared even if the exchange panics and no caller is left to observe it.
    fn start(&self, state: &mut SessionState, acquisition: Acquisition) -> PendingToken {
        let inner = Arc::clone(&self.inner);
        let supervisor = tokio::spawn(async move {
            let exchange = tokio::spawn(Arc::clone(&inner).acquire(acquisition));
            match exchange.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!(
                        "Token acquisition task for domain '{}' failed: {e}",
                        inner.label
                    );
                    let mut state = inner.state.lock().await;
                    state.in_flight = None;
                    state.tokens = None;
                    Err(AuthError::Aborted(e.to_string()))
                }
            }
        });

        let pending = async move {
            supervisor
                .await
                .unwrap_or_else(|e| Err(AuthError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        state.in_flight = Some(pending.clone());
        pending
    }
}

impl Inner {
    async fn acquire(self: Arc<Self>, acquisition: Acquisition) -> Result<SecretString, AuthError> {
        let result = match acquisition {
            Acquisition::Generate => self.generate().await.map(Exchanged::Generated),
            Acquisition::Refresh(refresh_token) => self
                .endpoint
                .refresh(&refresh_token)
                .await
                .map(|refreshed| Exchanged::Refreshed(refreshed.access_token))
                .map_err(|e| AuthError::RefreshFailed(e.to_string())),
        };

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.in_flight = None;

        match result {
            Ok(Exchanged::Generated(tokens)) => {
                log::debug!("Generated token pair for domain '{}'", self.label);
                let pair = TokenPair::from_generated(tokens, now);
                let access_token = pair.access_token.clone();
                state.tokens = Some(pair);
                Ok(access_token)
            }
            Ok(Exchanged::Refreshed(access_token)) => {
                log::debug!("Refreshed access token for domain '{}'", self.label);
                // A clear() during the exchange wins; the token is still returned
                if let Some(pair) = state.tokens.as_mut() {
                    pair.access_token = access_token.clone();
                    pair.access_expires_at = add_ms(now, self.options.access_token_lifetime_ms)
                        .min(pair.refresh_expires_at);
                }
                Ok(access_token)
            }
            Err(e) => {
                log::warn!("Token acquisition failed for domain '{}': {e}", self.label);
                state.tokens = None;
                Err(e)
            }
        }
    }

    async fn generate(&self) -> Result<GeneratedTokens, AuthError> {
        let api_key = self.api_key.as_ref().ok_or(AuthError::MissingApiKey)?;

        let request = TokenRequest {
            scopes: self.options.scopes.clone(),
            access_expiry: self.options.access_token_lifetime_ms,
            refresh_expiry: self.options.refresh_token_lifetime_ms,
        };

        self.endpoint
            .generate(api_key, &request)
            .await
            .map_err(|e| AuthError::GenerationFailed(e.to_string()))
    }
}

fn sensitive_value(value: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(value).ok()?;
    value.set_sensitive(true);
    Some(value)
}

fn ms_delta(ms: u64) -> TimeDelta {
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX)
}

fn add_ms(at: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    at.checked_add_signed(ms_delta(ms))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sub_ms(at: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    at.checked_sub_signed(ms_delta(ms))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::join_all;
    use sift_common::Scope;

    use super::*;
    use crate::error::ClientError;

    const DAY_MS: i64 = 86_400_000;

    struct ManualClock {
        origin: DateTime<Utc>,
        now: std::sync::Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            let origin = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
            Arc::new(Self {
                origin,
                now: std::sync::Mutex::new(origin),
            })
        }

        /// Moves the clock to `ms` after the origin.
        fn set_ms(&self, ms: i64) {
            *self.now.lock().unwrap() = self.origin + TimeDelta::milliseconds(ms);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Issues `A1, A2, ...` access tokens (shared by both exchanges) and
    /// `R1, R2, ...` refresh tokens, echoing the requested lifetimes.
    #[derive(Default)]
    struct MockEndpoint {
        generate_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        access_seq: AtomicUsize,
        refresh_seq: AtomicUsize,
        fail_generate: AtomicBool,
        fail_refresh: AtomicBool,
        delay: Duration,
        refresh_tokens_seen: std::sync::Mutex<Vec<String>>,
        requests_seen: std::sync::Mutex<Vec<TokenRequest>>,
    }

    impl MockEndpoint {
        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::default()
            })
        }

        fn generate_calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn next_access(&self) -> SecretString {
            let n = self.access_seq.fetch_add(1, Ordering::SeqCst) + 1;
            SecretString::new(format!("A{n}").into())
        }
    }

    #[async_trait]
    impl TokenEndpoint for MockEndpoint {
        async fn generate(
            &self,
            _api_key: &SecretString,
            request: &TokenRequest,
        ) -> Result<GeneratedTokens, ClientError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.requests_seen.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_generate.load(Ordering::SeqCst) {
                return Err(ClientError::ServiceUnavailable("token service down".to_string()));
            }

            let r = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(GeneratedTokens {
                access_token: self.next_access(),
                refresh_token: SecretString::new(format!("R{r}").into()),
                access_token_expiry: request.access_expiry,
                refresh_token_expiry: request.refresh_expiry,
            })
        }

        async fn refresh(
            &self,
            refresh_token: &SecretString,
        ) -> Result<RefreshedToken, ClientError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_tokens_seen
                .lock()
                .unwrap()
                .push(refresh_token.expose_secret().to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(ClientError::AuthenticationError("refresh token revoked".to_string()));
            }

            Ok(RefreshedToken {
                access_token: self.next_access(),
            })
        }
    }

    fn manager(
        endpoint: &Arc<MockEndpoint>,
        clock: &Arc<ManualClock>,
        api_key: Option<&str>,
        options: AuthOptions,
    ) -> AuthManager {
        AuthManager::with_clock(
            "test-domain",
            api_key.map(|k| SecretString::new(k.into())),
            options,
            Arc::clone(endpoint) as Arc<dyn TokenEndpoint>,
            Arc::clone(clock) as Arc<dyn Clock>,
        )
    }

    fn short_lived() -> AuthOptions {
        AuthOptions::builder()
            .scopes(ScopeSet::new([Scope::Discover, Scope::Event, Scope::Ingestion]))
            .access_token_lifetime_ms(1000)
            .refresh_token_lifetime_ms(5000)
            .expiry_buffer_ms(100)
            .build()
    }

    fn authorization(headers: &HeaderMap) -> Option<String> {
        headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_no_api_key_sends_no_header() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();

        for scopes in [ScopeSet::default(), ScopeSet::ingestion_only()] {
            let auth = manager(
                &endpoint,
                &clock,
                None,
                AuthOptions::builder().scopes(scopes).build(),
            );
            assert!(auth.auth_headers().await.is_empty());
            assert!(auth.auth_headers().await.is_empty());
            assert!(!auth.has_api_key());
        }

        assert_eq!(endpoint.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_api_key_access_token_errors() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(&endpoint, &ManualClock::new(), None, AuthOptions::default());

        assert_eq!(auth.access_token().await.unwrap_err(), AuthError::MissingApiKey);
        assert_eq!(endpoint.generate_calls(), 0);
        assert!(!auth.status().await.has_tokens);
    }

    #[tokio::test]
    async fn test_ingestion_only_sends_raw_key() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(
            &endpoint,
            &ManualClock::new(),
            Some("01-XXXX"),
            AuthOptions::builder()
                .scopes(ScopeSet::ingestion_only())
                .build(),
        );

        for _ in 0..3 {
            let headers = auth.auth_headers().await;
            assert_eq!(headers.len(), 1);
            assert_eq!(authorization(&headers).as_deref(), Some("01-XXXX"));
        }

        assert_eq!(endpoint.generate_calls(), 0);
        assert!(!auth.status().await.has_tokens);
    }

    #[tokio::test]
    async fn test_header_is_marked_sensitive() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(&endpoint, &ManualClock::new(), Some("k"), AuthOptions::default());

        let headers = auth.auth_headers().await;
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_generation_request_carries_scopes_and_lifetimes() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(
            &endpoint,
            &ManualClock::new(),
            Some("k"),
            AuthOptions::builder()
                .scopes(ScopeSet::new([Scope::Event, Scope::Discover]))
                .access_token_lifetime_ms(1234)
                .refresh_token_lifetime_ms(5678)
                .build(),
        );

        auth.access_token().await.unwrap();

        let requests = endpoint.requests_seen.lock().unwrap();
        assert_eq!(
            requests.as_slice(),
            &[TokenRequest {
                scopes: ScopeSet::new([Scope::Discover, Scope::Event]),
                access_expiry: 1234,
                refresh_expiry: 5678,
            }]
        );
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), AuthOptions::default());

        for at in [0, 3_600_000, DAY_MS - 60_001] {
            clock.set_ms(at);
            let headers = auth.auth_headers().await;
            assert_eq!(authorization(&headers).as_deref(), Some("Bearer A1"));
        }

        assert_eq!(endpoint.generate_calls(), 1);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_token_inside_expiry_buffer_is_refreshed() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), AuthOptions::default());

        auth.auth_headers().await;
        clock.set_ms(DAY_MS - 59_000);
        let headers = auth.auth_headers().await;

        assert_eq!(authorization(&headers).as_deref(), Some("Bearer A2"));
        assert_eq!(endpoint.generate_calls(), 1);
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_access_token_only() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        auth.access_token().await.unwrap();

        clock.set_ms(1000);
        let status = auth.status().await;
        assert!(status.has_tokens);
        assert!(!status.access_token_valid);
        assert!(status.refresh_token_valid);

        let token = auth.access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "A2");
        assert_eq!(endpoint.refresh_calls(), 1);

        // New expiry is 1000 + 1000; valid until the buffer at 1900
        clock.set_ms(1850);
        assert!(auth.status().await.access_token_valid);
        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A2");

        // Second refresh still presents the original refresh token
        clock.set_ms(1950);
        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A3");
        assert_eq!(
            endpoint.refresh_tokens_seen.lock().unwrap().as_slice(),
            &["R1".to_string(), "R1".to_string()]
        );
        assert_eq!(endpoint.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_never_outlives_refresh_token() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(
            &endpoint,
            &clock,
            Some("k"),
            AuthOptions::builder()
                .access_token_lifetime_ms(1000)
                .refresh_token_lifetime_ms(1500)
                .expiry_buffer_ms(100)
                .build(),
        );

        auth.access_token().await.unwrap();
        clock.set_ms(950);
        auth.access_token().await.unwrap();
        assert_eq!(endpoint.refresh_calls(), 1);

        // Clamped to the refresh expiry at 1500, so the buffer starts at 1400
        clock.set_ms(1420);
        let status = auth.status().await;
        assert!(!status.access_token_valid);
        assert!(status.refresh_token_valid);
    }

    #[tokio::test]
    async fn test_both_tokens_expired_regenerates() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        auth.access_token().await.unwrap();

        clock.set_ms(5000);
        let status = auth.status().await;
        assert!(status.has_tokens);
        assert!(!status.refresh_token_valid);

        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A2");
        assert_eq!(endpoint.generate_calls(), 2);
        assert_eq!(endpoint.refresh_calls(), 0);

        let status = auth.status().await;
        assert!(status.access_token_valid);
        assert!(status.refresh_token_valid);
    }

    #[tokio::test]
    async fn test_lifecycle_walkthrough() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        clock.set_ms(0);
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A1")
        );

        clock.set_ms(500);
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A1")
        );
        assert_eq!(endpoint.generate_calls(), 1);
        assert_eq!(endpoint.refresh_calls(), 0);

        clock.set_ms(950);
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A2")
        );
        assert_eq!(endpoint.refresh_calls(), 1);

        clock.set_ms(6000);
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A3")
        );
        assert_eq!(endpoint.generate_calls(), 2);
        assert_eq!(endpoint.refresh_seq.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_generation() {
        let endpoint = MockEndpoint::with_delay(Duration::from_millis(50));
        let auth = manager(&endpoint, &ManualClock::new(), Some("01-XXXX"), AuthOptions::default());

        let results = join_all((0..16).map(|_| auth.auth_headers())).await;

        assert_eq!(endpoint.generate_calls(), 1);
        for headers in &results {
            assert_eq!(authorization(headers).as_deref(), Some("Bearer A1"));
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_across_tasks_share_one_refresh() {
        let endpoint = MockEndpoint::with_delay(Duration::from_millis(50));
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        auth.access_token().await.unwrap();
        clock.set_ms(950);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.access_token().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "A2");
        }
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(endpoint.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_all_see_failure() {
        let endpoint = MockEndpoint::with_delay(Duration::from_millis(20));
        endpoint.fail_generate.store(true, Ordering::SeqCst);
        let auth = manager(&endpoint, &ManualClock::new(), Some("k"), AuthOptions::default());

        let results = join_all((0..5).map(|_| auth.access_token())).await;

        assert_eq!(endpoint.generate_calls(), 1);
        for result in results {
            assert!(matches!(result, Err(AuthError::GenerationFailed(_))));
        }
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back_and_retries() {
        let endpoint = Arc::new(MockEndpoint::default());
        endpoint.fail_generate.store(true, Ordering::SeqCst);
        let auth = manager(&endpoint, &ManualClock::new(), Some("01-XXXX"), AuthOptions::default());

        let headers = auth.auth_headers().await;
        assert_eq!(authorization(&headers).as_deref(), Some("01-XXXX"));
        assert!(!auth.status().await.has_tokens);

        // The failure is not cached
        auth.auth_headers().await;
        assert_eq!(endpoint.generate_calls(), 2);

        endpoint.fail_generate.store(false, Ordering::SeqCst);
        let headers = auth.auth_headers().await;
        assert_eq!(authorization(&headers).as_deref(), Some("Bearer A1"));
        assert_eq!(endpoint.generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_failure_discards_pair() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        auth.access_token().await.unwrap();
        endpoint.fail_refresh.store(true, Ordering::SeqCst);

        clock.set_ms(950);
        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert!(!auth.status().await.has_tokens);

        // Next attempt generates from the API key instead of refreshing again
        let headers = auth.auth_headers().await;
        assert_eq!(authorization(&headers).as_deref(), Some("Bearer A2"));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(endpoint.generate_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_header_falls_back() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("01-XXXX"), short_lived());

        auth.auth_headers().await;
        endpoint.fail_refresh.store(true, Ordering::SeqCst);
        clock.set_ms(950);

        let headers = auth.auth_headers().await;
        assert_eq!(authorization(&headers).as_deref(), Some("01-XXXX"));
    }

    #[tokio::test]
    async fn test_clear_forces_generation() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(&endpoint, &ManualClock::new(), Some("01-XXXX"), AuthOptions::default());

        auth.access_token().await.unwrap();
        assert!(auth.status().await.has_tokens);

        auth.clear().await;
        assert_eq!(
            auth.status().await,
            AuthStatus {
                has_tokens: false,
                access_token_valid: false,
                refresh_token_valid: false,
            }
        );

        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A2");
        assert_eq!(endpoint.generate_calls(), 2);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_status_has_no_side_effects() {
        let endpoint = Arc::new(MockEndpoint::default());
        let clock = ManualClock::new();
        let auth = manager(&endpoint, &clock, Some("k"), short_lived());

        clock.set_ms(10_000);
        auth.status().await;
        auth.status().await;

        assert_eq!(endpoint.generate_calls(), 0);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_acquisition_completes_after_caller_gives_up() {
        let endpoint = MockEndpoint::with_delay(Duration::from_millis(50));
        let auth = manager(&endpoint, &ManualClock::new(), Some("k"), AuthOptions::default());

        let abandoned = tokio::time::timeout(Duration::from_millis(5), auth.access_token()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(auth.status().await.has_tokens);
        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A1");
        assert_eq!(endpoint.generate_calls(), 1);
    }

    #[test]
    fn test_options_from_domain() {
        let domain = DomainConfig::new("d")
            .with_scopes(ScopeSet::ingestion_only())
            .with_token_lifetimes(10, 20);
        let options = AuthOptions::from(&domain);

        assert!(options.scopes.is_ingestion_only());
        assert_eq!(options.access_token_lifetime_ms, 10);
        assert_eq!(options.refresh_token_lifetime_ms, 20);
        assert_eq!(options.expiry_buffer_ms, DEFAULT_EXPIRY_BUFFER_MS);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let endpoint = Arc::new(MockEndpoint::default());
        let auth = manager(&endpoint, &ManualClock::new(), Some("super-secret"), AuthOptions::default());
        assert!(!format!("{auth:?}").contains("super-secret"));
    }

    /// Panics on the first generation and then issues `access_token`.
    struct FlakyEndpoint {
        calls: AtomicUsize,
        access_token: &'static str,
    }

    impl FlakyEndpoint {
        fn new(access_token: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                access_token,
            })
        }
    }

    #[async_trait]
    impl TokenEndpoint for FlakyEndpoint {
        #[allow(clippy::panic)]
        async fn generate(
            &self,
            _api_key: &SecretString,
            request: &TokenRequest,
        ) -> Result<GeneratedTokens, ClientError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("token endpoint blew up");
            }
            Ok(GeneratedTokens {
                access_token: SecretString::new(self.access_token.into()),
                refresh_token: SecretString::new("R".into()),
                access_token_expiry: request.access_expiry,
                refresh_token_expiry: request.refresh_expiry,
            })
        }

        async fn refresh(
            &self,
            _refresh_token: &SecretString,
        ) -> Result<RefreshedToken, ClientError> {
            Err(ClientError::ServiceUnavailable("unused".to_string()))
        }
    }

    fn flaky_manager(endpoint: &Arc<FlakyEndpoint>, api_key: &str) -> AuthManager {
        AuthManager::with_clock(
            "test-domain",
            Some(SecretString::new(api_key.into())),
            short_lived(),
            Arc::clone(endpoint) as Arc<dyn TokenEndpoint>,
            ManualClock::new() as Arc<dyn Clock>,
        )
    }

    #[tokio::test]
    async fn test_panicking_exchange_does_not_wedge_manager() {
        let endpoint = FlakyEndpoint::new("A1");
        let auth = flaky_manager(&endpoint, "01-XXXX");

        assert!(matches!(
            auth.access_token().await,
            Err(AuthError::Aborted(_))
        ));
        assert!(!auth.status().await.has_tokens);

        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A1");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_exchange_is_cleared_without_waiters() {
        let endpoint = FlakyEndpoint::new("A1");
        let auth = flaky_manager(&endpoint, "01-XXXX");

        // Start the exchange, then abandon it so nothing awaits the outcome
        let started = tokio::time::timeout(Duration::ZERO, auth.access_token()).await;
        assert!(started.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!auth.status().await.has_tokens);
        assert_eq!(auth.access_token().await.unwrap().expose_secret(), "A1");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_exchange_header_falls_back() {
        let endpoint = FlakyEndpoint::new("A1");
        let auth = flaky_manager(&endpoint, "01-XXXX");

        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("01-XXXX")
        );
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A1")
        );
    }

    #[tokio::test]
    async fn test_unusable_access_token_falls_back_to_key() {
        let endpoint = FlakyEndpoint::new("A1\nX-Injected: 1");
        endpoint.calls.store(1, Ordering::SeqCst);
        let auth = flaky_manager(&endpoint, "01-XXXX");

        let headers = auth.auth_headers().await;
        assert_eq!(authorization(&headers).as_deref(), Some("01-XXXX"));
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_refresh_over_http() {
        use sift_common::Settings;
        use wiremock::matchers::{body_string, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/account/1/access-token"))
            .and(header(API_KEY_HEADER, "01-XXXX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "A1",
                "refreshToken": "R1",
                "accessTokenExpiry": 1000,
                "refreshTokenExpiry": 5000
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/account/1/access-token"))
            .and(header("authorization", "Bearer R1"))
            .and(body_string(""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "A2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = crate::http::build_http_client(&Settings {
            max_retries: 0,
            ..Settings::default()
        })
        .unwrap();
        let clock = ManualClock::new();
        let auth = AuthManager::with_clock(
            "test-domain",
            Some(SecretString::new("01-XXXX".into())),
            short_lived(),
            Arc::new(HttpTokenEndpoint::new(
                http,
                format!("{}/account/1/access-token", server.uri()),
            )),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A1")
        );

        clock.set_ms(950);
        assert_eq!(
            authorization(&auth.auth_headers().await).as_deref(),
            Some("Bearer A2")
        );

        let status = auth.status().await;
        assert!(status.access_token_valid);
        assert!(status.refresh_token_valid);
    }
}
