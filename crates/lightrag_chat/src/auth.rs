//! Session credentials.
//!
//! [`AuthStore`] is a shared handle created at session start. It changes only
//! through [`AuthStore::login`] and [`AuthStore::logout`]; readers always see
//! the latest token.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::client::QueryError;
use crate::messages::{AuthStatus, LoginResponse};

/// Backend details remembered alongside the token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub core_version: String,
    pub api_version: String,
    pub webui_title: Option<String>,
    pub webui_description: Option<String>,
}

impl From<&LoginResponse> for ServerInfo {
    fn from(resp: &LoginResponse) -> Self {
        Self {
            core_version: resp.core_version.clone(),
            api_version: resp.api_version.clone(),
            webui_title: None,
            webui_description: None,
        }
    }
}

impl From<&AuthStatus> for ServerInfo {
    fn from(status: &AuthStatus) -> Self {
        Self {
            core_version: status.core_version.clone(),
            api_version: status.api_version.clone(),
            webui_title: status.webui_title.clone(),
            webui_description: status.webui_description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub access_token: String,
    pub is_guest: bool,
    pub server: ServerInfo,
}

#[derive(Debug, Clone, Default)]
pub struct AuthStore {
    inner: Arc<RwLock<AuthState>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn login(&self, token: impl Into<String>, is_guest: bool, server: ServerInfo) {
        *self.write() = AuthState {
            is_authenticated: true,
            access_token: token.into(),
            is_guest,
            server,
        };
    }

    /// Clears the token and flags. Server info is kept.
    pub fn logout(&self) {
        let mut state = self.write();
        state.is_authenticated = false;
        state.access_token.clear();
        state.is_guest = false;
    }

    /// Current bearer token, if any.
    pub fn access_token(&self) -> Option<String> {
        let state = self.read();
        (!state.access_token.is_empty()).then(|| state.access_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    pub fn snapshot(&self) -> AuthState {
        self.read().clone()
    }
}

/// User-facing text for a failed login.
pub fn describe_login_error(err: &QueryError) -> String {
    match err {
        QueryError::Status { status: 404, .. } => {
            "authentication is not enabled on the backend; no login needed".into()
        }
        QueryError::Status { status: 401, .. } => "incorrect username or password".into(),
        QueryError::Status { body, .. } => serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| err.to_string()),
        other => other.to_string(),
    }
}
