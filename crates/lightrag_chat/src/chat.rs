//! Conversation state: the message list and the loading flag.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::TimeZone;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `HH:MM` in local time. Out-of-range timestamps render as an empty string.
pub fn format_time(timestamp: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    is_loading: bool,
}

/// Shared handle to the conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    inner: Arc<RwLock<ChatState>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ChatState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChatState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_message(&self, message: ChatMessage) {
        self.write().messages.push(message);
    }

    /// Replace the content of message `id`. Returns false when it is gone.
    pub fn update_message(&self, id: &str, content: &str) -> bool {
        let mut state = self.write();
        match state.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content.clear();
                message.content.push_str(content);
                true
            }
            None => false,
        }
    }

    pub fn remove_message(&self, id: &str) {
        self.write().messages.retain(|m| m.id != id);
    }

    pub fn message(&self, id: &str) -> Option<ChatMessage> {
        self.read().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.read().messages.clone()
    }

    pub fn set_loading(&self, loading: bool) {
        self.write().is_loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    /// Set the loading flag unless it is already set.
    pub fn try_begin(&self) -> bool {
        let mut state = self.write();
        if state.is_loading {
            return false;
        }
        state.is_loading = true;
        true
    }

    pub fn clear_messages(&self) {
        self.write().messages.clear();
    }
}
