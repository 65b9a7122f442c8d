//! Top-level authentication state machine.
//!
//! The [`Authenticator`] owns the logged-out / logged-in state, exposes
//! login, register and logout, and hands out the [`AuthenticatedSession`]
//! that all further authenticated calls go through. State changes are
//! published on a `tokio::sync::watch` channel for UI binding.

use crate::api::{self, ApiErrorBody, UserProfile};
use crate::config::AuthConfig;
use crate::session::{AuthenticatedSession, RefreshInvalidHandler};
use crate::token::TokenController;
use crate::transport::{ApiRequest, Transport};
use gather_storage::{CredentialStore, SecureStorage, StorageError, TokenPair};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Top-level session state, observed by UI and other collaborators.
///
/// Exactly one [`AuthenticatedSession`] exists per logged-in period.
#[derive(Clone)]
pub enum SessionState {
    LoggedOut,
    LoggedIn {
        session: Arc<AuthenticatedSession>,
        user: Option<UserProfile>,
    },
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn { .. })
    }

    /// The cached profile, when logged in and already fetched.
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::LoggedIn { user, .. } => user.as_ref(),
            Self::LoggedOut => None,
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "LoggedOut"),
            Self::LoggedIn { user, .. } => f
                .debug_struct("LoggedIn")
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Error type for [`Authenticator::login`].
#[derive(Error, Debug)]
pub enum LoginError {
    /// The backend rejected the credentials
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A session is already active; log out first
    #[error("already logged in")]
    NotLoggedOut,

    /// The freshly issued credentials could not be persisted
    #[error("storing credentials failed: {0}")]
    Storage(#[from] StorageError),

    /// Anything else: transport failures, unexpected statuses, bad bodies
    #[error("login failed: {0}")]
    Other(String),
}

/// Error type for [`Authenticator::register`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("password too short")]
    PasswordTooShort,

    #[error("email address is malformed")]
    InvalidEmail,

    #[error("email address already taken")]
    EmailTaken,

    #[error("registration failed: {0}")]
    Other(String),
}

/// Error type for [`Authenticator::logout`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogoutError {
    #[error("no active session")]
    NotLoggedIn,
}

/// Owns the authentication state machine and builds the session wiring on
/// login.
///
/// Construct inside a Tokio runtime: restoring a stored session and
/// fetching the user profile spawn background tasks.
pub struct Authenticator {
    inner: Arc<AuthenticatorInner>,
}

struct AuthenticatorInner {
    config: AuthConfig,
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    state: watch::Sender<SessionState>,
}

impl Authenticator {
    /// Build an authenticator, restoring any previously stored session.
    ///
    /// With a stored token pair the machine starts directly in
    /// `LoggedIn { user: None }` and schedules the profile fetch; otherwise
    /// it starts `LoggedOut`.
    pub fn new(
        config: AuthConfig,
        transport: Arc<dyn Transport>,
        storage: Box<dyn SecureStorage>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(storage));
        let (state, _) = watch::channel(SessionState::LoggedOut);
        let inner = Arc::new(AuthenticatorInner {
            config,
            transport,
            store,
            state,
        });

        if let Some(controller) = TokenController::restore(Arc::clone(&inner.store)) {
            info!("Restored stored session");
            let session = AuthenticatorInner::build_session(&inner, Arc::new(controller));
            inner.state.send_replace(SessionState::LoggedIn {
                session: Arc::clone(&session),
                user: None,
            });
            AuthenticatorInner::spawn_profile_fetch(&inner, session);
        }

        Self { inner }
    }

    /// Subscribe to session state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// The active session, if logged in.
    pub fn session(&self) -> Option<Arc<AuthenticatedSession>> {
        match &*self.inner.state.borrow() {
            SessionState::LoggedIn { session, .. } => Some(Arc::clone(session)),
            SessionState::LoggedOut => None,
        }
    }

    /// Log in with email and password.
    ///
    /// Fails fast unless currently logged out. On success the state
    /// transitions to `LoggedIn { user: None }` and the profile fetch is
    /// scheduled; on failure the state is unchanged.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), LoginError> {
        if self.inner.state.borrow().is_logged_in() {
            return Err(LoginError::NotLoggedOut);
        }

        let base = self.inner.config.environment.base_url();
        let url = api::endpoint(&base, api::LOGIN_PATH).map_err(|e| LoginError::Other(e.to_string()))?;
        let request = api::post_json(
            url,
            &api::LoginRequestBody {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .map_err(|e| LoginError::Other(e.to_string()))?;

        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| LoginError::Other(e.to_string()))?;

        if !response.is_success() {
            let body = ApiErrorBody::from_response(&response);
            if (400..500).contains(&response.status) {
                debug!(status = response.status, "Login rejected");
                return Err(LoginError::InvalidCredentials);
            }
            return Err(LoginError::Other(format!(
                "status {}: {}",
                response.status,
                body.message.unwrap_or_default()
            )));
        }

        let pair: TokenPair =
            api::decode_json(&response).map_err(|e| LoginError::Other(e.to_string()))?;
        let controller = Arc::new(TokenController::new(pair, Arc::clone(&self.inner.store))?);
        let session = AuthenticatorInner::build_session(&self.inner, controller);

        info!("Login succeeded");
        self.inner.state.send_replace(SessionState::LoggedIn {
            session: Arc::clone(&session),
            user: None,
        });
        AuthenticatorInner::spawn_profile_fetch(&self.inner, session);
        Ok(())
    }

    /// Register a new account. Does not touch session state.
    pub async fn register(&self, email: &str, password: &str) -> Result<(), RegisterError> {
        let base = self.inner.config.environment.base_url();
        let url =
            api::endpoint(&base, api::REGISTER_PATH).map_err(|e| RegisterError::Other(e.to_string()))?;
        let request = api::post_json(
            url,
            &api::RegisterRequestBody {
                device_id: self.inner.config.device_id.clone(),
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .map_err(|e| RegisterError::Other(e.to_string()))?;

        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| RegisterError::Other(e.to_string()))?;

        if response.is_success() {
            match api::decode_json::<api::RegisterResponse>(&response) {
                Ok(body) => debug!(user_id = %body.user_id, "Registered new account"),
                Err(err) => debug!(error = %err, "Registration response had unexpected shape"),
            }
            return Ok(());
        }

        let body = ApiErrorBody::from_response(&response);
        if body.has_marker(api::metadata::PASSWORD_TOO_SHORT) {
            Err(RegisterError::PasswordTooShort)
        } else if body.has_marker(api::metadata::EMAIL_INVALID) {
            Err(RegisterError::InvalidEmail)
        } else if body.has_marker(api::metadata::EMAIL_ALREADY_TAKEN) {
            Err(RegisterError::EmailTaken)
        } else {
            Err(RegisterError::Other(format!(
                "status {}: {}",
                response.status,
                body.message.unwrap_or_default()
            )))
        }
    }

    /// Log out, tearing down the session and purging stored credentials.
    ///
    /// Valid only from the logged-in state.
    pub fn logout(&self) -> Result<(), LogoutError> {
        if self.inner.force_logout() {
            Ok(())
        } else {
            Err(LogoutError::NotLoggedIn)
        }
    }
}

impl AuthenticatorInner {
    /// Build the session for a logged-in period, wiring the refresh-invalid
    /// callback back into forced logout.
    fn build_session(
        inner: &Arc<Self>,
        tokens: Arc<TokenController>,
    ) -> Arc<AuthenticatedSession> {
        let weak = Arc::downgrade(inner);
        let on_refresh_invalid: RefreshInvalidHandler = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.force_logout();
            }
        });

        Arc::new(AuthenticatedSession::new(
            tokens,
            Arc::clone(&inner.transport),
            inner.config.clone(),
            on_refresh_invalid,
        ))
    }

    /// Tear down the active session, if any. Returns whether one existed.
    ///
    /// Idempotent, so the refresh-invalid callback and an explicit logout
    /// can race without double teardown.
    fn force_logout(&self) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|state| match state {
            SessionState::LoggedOut => false,
            SessionState::LoggedIn { session, .. } => {
                previous = Some(Arc::clone(session));
                *state = SessionState::LoggedOut;
                true
            }
        });

        match previous {
            Some(session) => {
                info!("Logged out");
                session.token_controller().dispose();
                true
            }
            None => false,
        }
    }

    /// Fetch the user profile through the session, off the caller's path.
    ///
    /// Failure leaves `user` as `None`; it is logged, not retried.
    fn spawn_profile_fetch(inner: &Arc<Self>, session: Arc<AuthenticatedSession>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            match fetch_profile(&inner.config, session.as_ref()).await {
                Ok(profile) => {
                    inner.state.send_if_modified(|state| match state {
                        SessionState::LoggedIn {
                            session: active,
                            user,
                        } if Arc::ptr_eq(active, &session) => {
                            debug!(user_id = %profile.id, "Cached user profile");
                            *user = Some(profile.clone());
                            true
                        }
                        // Logged out (or re-logged-in) while the fetch was in
                        // flight; drop the stale profile.
                        _ => false,
                    });
                }
                Err(error) => warn!(error = %error, "User profile fetch failed"),
            }
        });
    }
}

async fn fetch_profile(
    config: &AuthConfig,
    session: &AuthenticatedSession,
) -> Result<UserProfile, String> {
    let url = api::endpoint(&config.environment.base_url(), api::USER_PATH)
        .map_err(|e| e.to_string())?;
    let response = session
        .send(ApiRequest::get(url))
        .await
        .map_err(|e| e.to_string())?;
    if !response.is_success() {
        return Err(format!("user endpoint returned status {}", response.status));
    }
    api::decode_json::<UserProfile>(&response).map_err(|e| e.to_string())
}
