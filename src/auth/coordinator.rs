use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use vigil_schema::TokenPair;

use super::policy::{DefaultExpiryPolicy, ExpiryPolicy};
use super::request::{ApiRequest, ApiResponse, FailureSignal, TransportError};
use super::store::TokenStore;
use crate::error::AuthError;

/// Performs one request. Non-2xx answers are `Ok`; only transport failures are `Err`.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait RefreshCall: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
}

/// Notified once per refresh cycle that ends in a fatal outcome
/// (`NoRefreshToken` or `RefreshFailed`). Typically clears the session.
#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_session_expired(&self, error: &AuthError);
}

type RefreshOutcome = Result<TokenPair, AuthError>;
type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

struct RefreshState {
    in_progress: bool,
    cycle: u64,
    /// Receiver side of the current cycle's outcome channel; replaced on every new cycle.
    latest: Option<OutcomeReceiver>,
}

struct Inner {
    api_base: Url,
    store: Arc<dyn TokenStore>,
    executor: Arc<dyn RequestExecutor>,
    refresher: Arc<dyn RefreshCall>,
    policy: Arc<dyn ExpiryPolicy>,
    listener: Option<Arc<dyn SessionListener>>,
    state: Mutex<RefreshState>,
}

/// Keeps requests to the governed API authenticated across access token expiry.
///
/// Cheap to clone; clones share the same refresh state, so one coordinator built at the
/// composition root serves every request path.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

pub struct RefreshCoordinatorBuilder {
    api_base: Url,
    store: Arc<dyn TokenStore>,
    executor: Arc<dyn RequestExecutor>,
    refresher: Arc<dyn RefreshCall>,
    policy: Arc<dyn ExpiryPolicy>,
    listener: Option<Arc<dyn SessionListener>>,
}

impl RefreshCoordinatorBuilder {
    pub fn policy(mut self, policy: Arc<dyn ExpiryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> RefreshCoordinator {
        RefreshCoordinator {
            inner: Arc::new(Inner {
                api_base: normalize_base(self.api_base),
                store: self.store,
                executor: self.executor,
                refresher: self.refresher,
                policy: self.policy,
                listener: self.listener,
                state: Mutex::new(RefreshState {
                    in_progress: false,
                    cycle: 0,
                    latest: None,
                }),
            }),
        }
    }
}

impl RefreshCoordinator {
    pub fn builder(
        api_base: Url,
        store: Arc<dyn TokenStore>,
        executor: Arc<dyn RequestExecutor>,
        refresher: Arc<dyn RefreshCall>,
    ) -> RefreshCoordinatorBuilder {
        RefreshCoordinatorBuilder {
            api_base,
            store,
            executor,
            refresher,
            policy: Arc::new(DefaultExpiryPolicy::default()),
            listener: None,
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.inner.api_base
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// True when `url` lies under the configured API base (same origin, nested path).
    pub fn governs(&self, url: &Url) -> bool {
        let base = &self.inner.api_base;
        if url.origin() != base.origin() {
            return false;
        }
        let base_path = base.path();
        let path = url.path();
        path.starts_with(base_path) || path == base_path.trim_end_matches('/')
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_progress
    }

    /// Number of refresh cycles started so far.
    pub fn refresh_cycles(&self) -> u64 {
        self.inner.state.lock().cycle
    }

    /// Adds the current access token to a governed request; anything else passes through.
    pub async fn attach_token(&self, mut request: ApiRequest) -> ApiRequest {
        if !self.governs(&request.url) {
            return request;
        }
        let Some(tokens) = self.inner.store.read().await else {
            return request;
        };
        if tokens.access_token.is_empty() {
            return request;
        }
        if let Err(e) = request.set_authorization(&tokens.authorization_value()) {
            warn!(url = %request.url, error = %e, "Access token is not a valid header value; sending without it");
        }
        request
    }

    /// Dispatch path: attach, execute, and recover from token expiry.
    ///
    /// Non-2xx responses that are not expiry signals come back as `Ok`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, AuthError> {
        let governed = self.governs(&request.url);
        let request = self.attach_token(request).await;
        let token_attached = governed && request.authorization().is_some();

        let signal = match self.inner.executor.execute(request.clone()).await {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => {
                let signal = FailureSignal::from_response(&response, token_attached);
                if !(governed && self.inner.policy.is_token_expired(&signal)) {
                    return Ok(response);
                }
                signal
            }
            Err(e) => {
                let signal = FailureSignal::opaque(e.to_string(), token_attached);
                if !(governed && self.inner.policy.is_token_expired(&signal)) {
                    return Err(AuthError::Request(signal));
                }
                signal
            }
        };

        self.handle_auth_failure(request, signal).await
    }

    /// Recovers a request that failed with `failure`.
    ///
    /// Expiry failures are resolved through the single-flight refresh and the request is
    /// replayed with the refreshed token; any other failure is returned unchanged.
    pub async fn handle_auth_failure(
        &self,
        request: ApiRequest,
        failure: FailureSignal,
    ) -> Result<ApiResponse, AuthError> {
        if !self.governs(&request.url) || !self.inner.policy.is_token_expired(&failure) {
            return Err(AuthError::Request(failure));
        }

        // The token was already replaced by a cycle that finished after this request left.
        if let Some(current) = self.newer_token_than(&request).await {
            debug!(url = %request.url, "Request carried a superseded token; replaying with current token");
            return self.replay(request, &current).await;
        }

        let rx = self.join_or_start_refresh();
        let tokens = wait_for_outcome(rx).await?;
        self.replay(request, &tokens).await
    }

    async fn newer_token_than(&self, request: &ApiRequest) -> Option<TokenPair> {
        let sent = request.authorization()?;
        if self.is_refreshing() {
            return None;
        }
        let current = self.inner.store.read().await?;
        (!current.access_token.is_empty() && current.authorization_value() != sent)
            .then_some(current)
    }

    /// Check-and-set of the in-progress flag, done under the lock before any await.
    fn join_or_start_refresh(&self) -> OutcomeReceiver {
        let mut state = self.inner.state.lock();
        // A closed channel means the cycle's task died without publishing.
        if state.in_progress
            && let Some(rx) = state.latest.as_ref()
            && rx.has_changed().is_ok()
        {
            debug!(cycle = state.cycle, "Refresh in progress; queueing request");
            return rx.clone();
        }

        state.in_progress = true;
        state.cycle += 1;
        let cycle = state.cycle;
        let (tx, rx) = watch::channel(None);
        state.latest = Some(rx.clone());
        drop(state);

        info!(cycle, "Access token expired; starting refresh");

        // Spawned so the cycle completes even if the initiating request is dropped.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let guard = CycleGuard {
                inner: inner.clone(),
                cycle,
            };
            let outcome = inner.run_refresh(cycle).await;
            drop(guard);

            if let (Err(e), Some(listener)) = (&outcome, inner.listener.as_ref())
                && e.requires_reauthentication()
            {
                listener.on_session_expired(e).await;
            }

            // Receivers may all be gone already; nothing to deliver then.
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    async fn replay(
        &self,
        mut request: ApiRequest,
        tokens: &TokenPair,
    ) -> Result<ApiResponse, AuthError> {
        if let Err(e) = request.set_authorization(&tokens.authorization_value()) {
            return Err(AuthError::RefreshFailed {
                status: None,
                message: format!("refreshed access token is not a valid header value: {e}"),
            });
        }

        match self.inner.executor.execute(request).await {
            Ok(response) => {
                if !response.is_success() {
                    let signal = FailureSignal::from_response(&response, true);
                    if self.inner.policy.is_token_expired(&signal) {
                        warn!(status = %response.status, "Replayed request rejected as expired again");
                        return Err(AuthError::ExpiredToken);
                    }
                }
                Ok(response)
            }
            Err(e) => Err(AuthError::Request(FailureSignal::opaque(e.to_string(), true))),
        }
    }
}

impl Inner {
    async fn run_refresh(&self, cycle: u64) -> RefreshOutcome {
        let Some(current) = self
            .store
            .read()
            .await
            .filter(TokenPair::has_refresh_token)
        else {
            warn!(cycle, "No refresh token available; refresh aborted");
            return Err(AuthError::NoRefreshToken);
        };

        match self.refresher.refresh(&current.refresh_token).await {
            Ok(mut tokens) => {
                // Servers that do not rotate refresh tokens omit them from the answer.
                if !tokens.has_refresh_token() {
                    tokens.refresh_token = current.refresh_token;
                }
                self.store.write(tokens.clone()).await;
                info!(cycle, expires_in = tokens.expires_in, "Access token refreshed");
                Ok(tokens)
            }
            Err(e) => {
                let e = match e {
                    e @ (AuthError::RefreshFailed { .. } | AuthError::NoRefreshToken) => e,
                    other => AuthError::RefreshFailed {
                        status: other.status(),
                        message: other.to_string(),
                    },
                };
                warn!(cycle, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }
}

/// Clears the in-progress flag when a cycle's task ends, including by panic or abort.
struct CycleGuard {
    inner: Arc<Inner>,
    cycle: u64,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if state.cycle == self.cycle && state.in_progress {
            state.in_progress = false;
            debug!(cycle = self.cycle, "Refresh cycle ended");
        }
    }
}

async fn wait_for_outcome(mut rx: OutcomeReceiver) -> RefreshOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone().unwrap_or(Err(AuthError::RefreshAborted)),
        Err(_) => Err(AuthError::RefreshAborted),
    }
}

fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);
    base
}
