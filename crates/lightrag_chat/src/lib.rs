//! LightRAG chat client library: runtime endpoint resolution, streamed NDJSON
//! queries, session credentials and conversation state.
//! Used by the `lightrag-chat` binary.

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod context;
pub mod messages;
pub mod ndjson;
pub mod resolver;
pub mod session;

pub use auth::{describe_login_error, AuthStore, ServerInfo};
pub use chat::{ChatMessage, ChatStore, Role};
pub use client::{Callbacks, QueryClient, QueryError, QueryObserver};
pub use config::{default_config_path, Config, ConfigError};
pub use context::{NetworkContext, PageLocation, SharedContext, StaticContext};
pub use messages::{AuthStatus, LoginResponse};
pub use resolver::{Authority, Resolver, Scheme};
pub use session::{ChatSession, SessionError};
