//! Wire types for the LightRAG HTTP API. Client ↔ server JSON.

use serde::{Deserialize, Serialize};

/// Retrieval mode sent with every query.
pub const QUERY_MODE: &str = "local";

/// Client → server: body of `POST /query` and `POST /query/stream`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
    pub mode: &'static str,
    pub stream: bool,
}

impl<'a> QueryRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            mode: QUERY_MODE,
            stream: true,
        }
    }

    /// Body for the non-streamed `POST /query`.
    pub fn blocking(query: &'a str) -> Self {
        Self {
            stream: false,
            ..Self::new(query)
        }
    }
}

/// Server → client: one NDJSON line of a streamed answer. Only `response` is
/// consumed; every other field is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: Option<String>,
}

impl Envelope {
    /// The text delta carried by this line, if any. Empty strings carry nothing.
    pub fn delta(self) -> Option<String> {
        self.response.filter(|r| !r.is_empty())
    }
}

/// Client → server: `POST /login` form fields.
#[derive(Debug, Clone, Serialize)]
pub struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Server → client: `POST /login` reply as sent by the backend.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawLoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub user_info: Option<serde_json::Value>,
    #[serde(default)]
    pub core_version: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Normalized login result.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_info: serde_json::Value,
    pub core_version: String,
    pub api_version: String,
}

impl LoginResponse {
    pub(crate) fn from_raw(raw: RawLoginResponse, username: &str) -> Self {
        Self {
            access_token: raw.access_token,
            user_info: raw
                .user_info
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| serde_json::json!({ "username": username })),
            core_version: raw.core_version.unwrap_or_default(),
            api_version: raw.api_version.unwrap_or_default(),
        }
    }
}

/// Server → client: `GET /health`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct HealthResponse {
    #[serde(default)]
    pub auth_mode: Option<String>,
    #[serde(default)]
    pub core_version: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub webui_title: Option<String>,
    #[serde(default)]
    pub webui_description: Option<String>,
}

/// Server → client: `GET /auth-status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GuestTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Whether the backend requires login, plus a guest token when it does not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub auth_configured: bool,
    pub access_token: Option<String>,
    pub core_version: String,
    pub api_version: String,
    pub webui_title: Option<String>,
    pub webui_description: Option<String>,
}

impl AuthStatus {
    pub(crate) fn from_health(health: HealthResponse) -> Self {
        Self {
            auth_configured: health.auth_mode.as_deref() != Some("disabled"),
            access_token: None,
            core_version: health.core_version.unwrap_or_default(),
            api_version: health.api_version.unwrap_or_default(),
            webui_title: health.webui_title.filter(|t| !t.is_empty()),
            webui_description: health.webui_description.filter(|d| !d.is_empty()),
        }
    }
}
