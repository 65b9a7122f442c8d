//! Request building and response decoding for the auth endpoints.

use crate::transport::{ApiRequest, ApiResponse, Method, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub(crate) const LOGIN_PATH: &str = "auth/login";
pub(crate) const REGISTER_PATH: &str = "register";
pub(crate) const REFRESH_PATH: &str = "auth/refresh-session";
pub(crate) const USER_PATH: &str = "user";

/// Validation markers the backend attaches to error bodies.
pub mod metadata {
    pub const PASSWORD_TOO_SHORT: &str = "PASSWORD_TOO_SHORT";
    pub const EMAIL_INVALID: &str = "EMAIL_INVALID";
    pub const EMAIL_ALREADY_TAKEN: &str = "EMAIL_ALREADY_TAKEN";
    pub const REFRESH_TOKEN_INVALID: &str = "REFRESH_TOKEN_INVALID";
}

/// Error body the backend attaches to non-success responses.
///
/// Every field is optional on the wire; missing pieces default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Vec<String>,
}

impl ApiErrorBody {
    /// Decode leniently: a missing or malformed body yields the default.
    pub fn from_response(response: &ApiResponse) -> Self {
        serde_json::from_slice(&response.body).unwrap_or_default()
    }

    /// Whether the metadata carries the given validation marker.
    pub fn has_marker(&self, marker: &str) -> bool {
        self.metadata.iter().any(|entry| entry == marker)
    }
}

/// The signed-in user's profile, as returned by `GET user`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequestBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequestBody {
    pub device_id: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterResponse {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequestBody {
    pub refresh_token: String,
}

/// Resolve an endpoint path against the environment base URL.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, TransportError> {
    base.join(path)
        .map_err(|e| TransportError::Encoding(e.to_string()))
}

/// Build a JSON `POST` request.
pub(crate) fn post_json<T: Serialize>(url: Url, model: &T) -> Result<ApiRequest, TransportError> {
    let body = serde_json::to_vec(model).map_err(|e| TransportError::Encoding(e.to_string()))?;
    let mut request = ApiRequest::new(Method::Post, url);
    request.set_header("Content-Type", "application/json");
    request.body = Some(body);
    Ok(request)
}

/// Decode a JSON response body.
pub(crate) fn decode_json<T: DeserializeOwned>(
    response: &ApiResponse,
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(&response.body)
}
