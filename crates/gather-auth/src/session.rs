//! Authenticated HTTP exchange with single-flight token refresh.
//!
//! [`AuthenticatedSession`] wraps a [`Transport`] and attaches the current
//! access token to every outbound request. A 401 triggers one coordinated
//! token refresh: concurrent callers share the in-flight refresh instead of
//! starting a second one, and the original request is replayed exactly once
//! with the refreshed token.

use crate::api::{self, ApiErrorBody};
use crate::config::AuthConfig;
use crate::retry::{retry_with_policy, DelayPolicy, RetryError};
use crate::token::TokenController;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use gather_storage::TokenPair;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Additional attempts after the first refresh call.
const REFRESH_RETRY_BUDGET: u32 = 2;

/// Delay between refresh attempts.
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Failure of the token refresh operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The backend rejected the refresh token itself; terminal, never retried
    #[error("refresh token rejected by the backend")]
    TokenInvalid,

    /// The refresh endpoint answered with an unexpected error status
    #[error("refresh request failed with status {0}")]
    Http(u16),

    /// The refresh request never completed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The refresh endpoint answered success with an unreadable body
    #[error("malformed refresh response: {0}")]
    Decode(String),

    /// The refresh was cancelled
    #[error("refresh cancelled")]
    Cancelled,

    /// The refresh task was torn down before settling
    #[error("refresh aborted")]
    Aborted,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

/// Callback fired when the refresh token itself is rejected, signalling the
/// owning authenticator to force a logout.
pub type RefreshInvalidHandler = Arc<dyn Fn() + Send + Sync>;

/// One authenticated HTTP exchange with automatic, single-flight,
/// bounded-retry token refresh on expiry.
///
/// The session is stateless apart from the references it holds and the
/// in-flight refresh handle; exactly one instance exists per logged-in
/// period, shared behind an `Arc`.
pub struct AuthenticatedSession {
    tokens: Arc<TokenController>,
    transport: Arc<dyn Transport>,
    config: AuthConfig,
    in_flight_refresh: Arc<Mutex<Option<SharedRefresh>>>,
    on_refresh_invalid: RefreshInvalidHandler,
}

impl AuthenticatedSession {
    pub fn new(
        tokens: Arc<TokenController>,
        transport: Arc<dyn Transport>,
        config: AuthConfig,
        on_refresh_invalid: RefreshInvalidHandler,
    ) -> Self {
        Self {
            tokens,
            transport,
            config,
            in_flight_refresh: Arc::new(Mutex::new(None)),
            on_refresh_invalid,
        }
    }

    pub(crate) fn token_controller(&self) -> &Arc<TokenController> {
        &self.tokens
    }

    /// Perform one authenticated exchange.
    ///
    /// A 401 triggers a refresh-and-replay cycle: on refresh success the
    /// original request is re-issued exactly once with the new token and that
    /// second response is returned regardless of its outcome. On refresh
    /// failure the original 401 response is returned; the refresh error is
    /// not surfaced here. Any non-401 response is returned as-is.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = self.send_with_current_token(request.clone()).await?;
        if response.status != 401 {
            return Ok(response);
        }

        match self.refresh_shared().await {
            Ok(_) => self.send_with_current_token(request).await,
            Err(error) => {
                debug!(error = %error, "Token refresh failed; returning original response");
                Ok(response)
            }
        }
    }

    async fn send_with_current_token(
        &self,
        mut request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let access_token = self.tokens.current().access_token;
        request.set_header("Authorization", format!("Bearer {access_token}"));
        self.transport.send(request).await
    }

    /// Await the in-flight refresh, starting one if none is running.
    ///
    /// The set/check/clear of the handle is atomic relative to concurrent
    /// 401s: callers racing here either join the stored handle or install a
    /// new one while holding the slot lock.
    async fn refresh_shared(&self) -> Result<TokenPair, RefreshError> {
        let refresh = {
            let mut slot = self.in_flight_refresh.lock().expect("lock poisoned");
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let started = self.spawn_refresh();
                    *slot = Some(started.clone());
                    started
                }
            }
        };
        refresh.await
    }

    /// Run the refresh in its own task so that a caller being cancelled
    /// cannot cancel the refresh for the other waiters.
    fn spawn_refresh(&self) -> SharedRefresh {
        let tokens = Arc::clone(&self.tokens);
        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let on_refresh_invalid = Arc::clone(&self.on_refresh_invalid);
        let slot = Arc::clone(&self.in_flight_refresh);

        let task = tokio::spawn(async move {
            let result = refresh_with_retry(&tokens, transport.as_ref(), &config).await;
            match &result {
                Ok(pair) => {
                    debug!("Token refresh succeeded");
                    tokens.set(pair.clone());
                }
                Err(RefreshError::TokenInvalid) => {
                    warn!("Refresh token rejected by the backend; forcing logout");
                    on_refresh_invalid();
                }
                Err(error) => {
                    warn!(error = %error, "Token refresh failed");
                }
            }
            // Clear the handle so a future 401 starts a new refresh. Only
            // this task clears the slot, and a replacement can be installed
            // only after it is empty.
            *slot.lock().expect("lock poisoned") = None;
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(_) => Err(RefreshError::Aborted),
            }
        }
        .boxed()
        .shared()
    }
}

/// Bounded retry around the refresh call: transient network/server errors
/// are retried, a definitive refresh-token rejection is not.
async fn refresh_with_retry(
    tokens: &Arc<TokenController>,
    transport: &dyn Transport,
    config: &AuthConfig,
) -> Result<TokenPair, RefreshError> {
    let cancel = CancellationToken::new();
    let result = retry_with_policy(
        |error: &RefreshError| !matches!(error, RefreshError::TokenInvalid),
        DelayPolicy::Constant(REFRESH_RETRY_DELAY),
        REFRESH_RETRY_BUDGET,
        &cancel,
        || request_refresh(tokens, transport, config),
    )
    .await;

    match result {
        Ok(pair) => Ok(pair),
        Err(RetryError::Cancelled) => Err(RefreshError::Cancelled),
        Err(RetryError::Operation(error)) => Err(error),
    }
}

/// One call to the refresh endpoint.
async fn request_refresh(
    tokens: &Arc<TokenController>,
    transport: &dyn Transport,
    config: &AuthConfig,
) -> Result<TokenPair, RefreshError> {
    let refresh_token = tokens.current().refresh_token;
    let url = api::endpoint(&config.environment.base_url(), api::REFRESH_PATH)?;
    let request = api::post_json(url, &api::RefreshRequestBody { refresh_token })?;

    let response = transport.send(request).await?;
    if response.is_success() {
        return api::decode_json::<TokenPair>(&response)
            .map_err(|e| RefreshError::Decode(e.to_string()));
    }

    let body = ApiErrorBody::from_response(&response);
    if body.has_marker(api::metadata::REFRESH_TOKEN_INVALID) || matches!(response.status, 400 | 401)
    {
        return Err(RefreshError::TokenInvalid);
    }
    Err(RefreshError::Http(response.status))
}
