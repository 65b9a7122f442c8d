//! Authenticated-session subsystem for the Gather client.
//!
//! This crate owns everything between "the user typed a password" and "an
//! authenticated request came back":
//!
//! - **[`Authenticator`]**: the top-level logged-out / logged-in state
//!   machine with login, register and logout, restoring a stored session at
//!   startup and publishing [`SessionState`] on a watch channel.
//! - **[`AuthenticatedSession`]**: the request wrapper that attaches the
//!   bearer credential, detects expiry and performs a coordinated,
//!   single-flight token refresh with bounded retry.
//! - **[`TokenController`]**: the single serialized owner of the in-memory
//!   token pair, keeping it consistent with the secure store.
//! - **[`retry_with_policy`]**: the generic bounded-retry driver the refresh
//!   coordinator is built on.
//!
//! Credentials persist through `gather-storage`; the network is reached
//! through the [`Transport`] trait so everything here is testable without a
//! server.
//!
//! # Concurrency
//!
//! Many callers may observe a 401 at once. The session guarantees exactly
//! one refresh HTTP call per expiry: concurrent callers await the same
//! in-flight refresh, and all of them end up replaying against the one pair
//! the completed refresh produced. A caller being cancelled while waiting
//! does not cancel the refresh for the others.

mod api;
mod authenticator;
mod config;
mod retry;
mod session;
mod token;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiErrorBody, UserProfile};
pub use authenticator::{Authenticator, LoginError, LogoutError, RegisterError, SessionState};
pub use config::{ApiEnvironment, AuthConfig};
pub use retry::{retry_with_policy, DelayPolicy, RetryError};
pub use session::{AuthenticatedSession, RefreshError, RefreshInvalidHandler};
pub use token::TokenController;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};

pub use gather_storage::{
    create_credential_store, create_storage, CredentialStore, SecureStorage, StorageError,
    StorageKeys, TokenPair,
};
