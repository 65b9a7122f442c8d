//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Access token for the current session
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token for the current session
    pub const REFRESH_TOKEN: &'static str = "refresh_token";
}
