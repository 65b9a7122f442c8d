//! Client configuration.

use url::Url;
use uuid::Uuid;

/// Backend environment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEnvironment {
    Stage,
    Prod,
}

impl ApiEnvironment {
    /// Base URL of the versioned HTTP API for this environment.
    pub fn base_url(&self) -> Url {
        let host = match self {
            Self::Stage => "stage",
            Self::Prod => "prod",
        };
        Url::parse(&format!("https://{host}.gather.events/api/v1/"))
            .expect("static base URL is valid")
    }
}

/// Configuration shared by the authenticator and its sessions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: ApiEnvironment,
    /// Install-scoped identifier sent with registration.
    pub device_id: String,
}

impl AuthConfig {
    /// Build a config with a freshly generated device identifier.
    pub fn new(environment: ApiEnvironment) -> Self {
        Self {
            environment,
            device_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_device_id(environment: ApiEnvironment, device_id: impl Into<String>) -> Self {
        Self {
            environment,
            device_id: device_id.into(),
        }
    }
}
