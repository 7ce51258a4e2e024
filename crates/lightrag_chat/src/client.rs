//! HTTP client for the LightRAG backend: streamed query (POST /query/stream,
//! NDJSON reply), plus login, auth status and plain query.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::auth::AuthStore;
use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::messages::{
    AuthStatus, GuestTokenResponse, HealthResponse, LoginForm, LoginResponse, QueryRequest,
    RawLoginResponse,
};
use crate::ndjson::decode_stream;
use crate::resolver::{Authority, Resolver};

pub const STREAM_PATH: &str = "/query/stream";
pub const QUERY_PATH: &str = "/query";
pub const LOGIN_PATH: &str = "/login";
pub const HEALTH_PATH: &str = "/health";
pub const AUTH_STATUS_PATH: &str = "/auth-status";

const NDJSON: &str = "application/x-ndjson";

/// Query failure, confined to the call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The backend answered with a non-success status.
    #[error("HTTP error! status: {status}, URL: {url}, body: {body}")]
    Status { status: u16, url: String, body: String },
    /// Connection-level failure before or during the reply.
    #[error(
        "cannot reach the backend at {authority}. Check: 1. the service is running on port {port}; \
         2. firewall settings; 3. network connectivity"
    )]
    Unreachable {
        authority: String,
        port: u16,
        #[source]
        source: reqwest::Error,
    },
    #[error(transparent)]
    Http(reqwest::Error),
}

impl QueryError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn unreachable(source: reqwest::Error, authority: &Authority) -> Self {
        QueryError::Unreachable {
            authority: authority.to_string(),
            port: authority.port(),
            source,
        }
    }

    /// Transport failures get the remediation message; everything else keeps
    /// its own.
    fn classify(err: reqwest::Error, authority: &Authority) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::unreachable(err, authority)
        } else {
            QueryError::Http(err)
        }
    }
}

/// Receives the outcome of [`QueryClient::stream_query`].
///
/// `on_delta` runs once per answer line, in server order. Afterwards exactly
/// one of `on_complete` (clean end of stream) or `on_error` runs.
pub trait QueryObserver {
    fn on_delta(&mut self, delta: &str);

    fn on_complete(&mut self) {}

    fn on_error(&mut self, error: QueryError) {
        tracing::error!(error = %error, "streamed query failed");
    }
}

type DeltaFn<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type CompleteFn<'a> = Box<dyn FnOnce() + Send + 'a>;
type ErrorFn<'a> = Box<dyn FnOnce(QueryError) + Send + 'a>;

/// Closure-backed [`QueryObserver`]. Completion and error handlers are optional;
/// a missing error handler logs the error.
pub struct Callbacks<'a> {
    on_delta: DeltaFn<'a>,
    on_complete: Option<CompleteFn<'a>>,
    on_error: Option<ErrorFn<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new(on_delta: impl FnMut(&str) + Send + 'a) -> Self {
        Self {
            on_delta: Box::new(on_delta),
            on_complete: None,
            on_error: None,
        }
    }

    pub fn with_complete(mut self, on_complete: impl FnOnce() + Send + 'a) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    pub fn with_error(mut self, on_error: impl FnOnce(QueryError) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl QueryObserver for Callbacks<'_> {
    fn on_delta(&mut self, delta: &str) {
        (self.on_delta)(delta);
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }

    fn on_error(&mut self, error: QueryError) {
        match self.on_error.take() {
            Some(f) => f(error),
            None => tracing::error!(error = %error, "streamed query failed"),
        }
    }
}

/// LightRAG backend client. Cheap to clone; clones share the connection pool,
/// resolver and auth store. Holds no per-query state, so independent queries
/// may run concurrently.
#[derive(Debug, Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    resolver: Resolver,
    auth: AuthStore,
    request_timeout: Duration,
}

impl QueryClient {
    pub fn new(resolver: Resolver, auth: AuthStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            resolver,
            auth,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Config, resolver: Resolver, auth: AuthStore) -> Self {
        Self::new(resolver, auth).request_timeout(config.request_timeout())
    }

    /// Timeout for login, health and plain query calls. Streamed queries have none.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    // The token is read at request construction, never cached.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Stream the answer to `text` as a lazy sequence of deltas.
    ///
    /// The sequence ends after the last delta on a clean end of stream, or
    /// right after the first `Err`. Dropping it cancels the request.
    pub fn query_stream(
        &self,
        text: &str,
    ) -> impl Stream<Item = Result<String, QueryError>> + Send + 'static {
        let this = self.clone();
        let text = text.to_string();
        async_stream::stream! {
            let authority = this.resolver.resolve();
            let url = authority.join(STREAM_PATH);
            tracing::debug!(url = %url, "sending streamed query");

            let request = this
                .authorize(this.http.post(&url))
                .header(ACCEPT, NDJSON)
                .json(&QueryRequest::new(&text));
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(QueryError::classify(e, &authority));
                    return;
                }
            };
            let response = match ensure_success(response, &url).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut deltas = std::pin::pin!(decode_stream(response.bytes_stream()));
            while let Some(item) = deltas.next().await {
                match item {
                    Ok(delta) => yield Ok(delta),
                    Err(e) => {
                        yield Err(QueryError::unreachable(e, &authority));
                        return;
                    }
                }
            }
            tracing::debug!(url = %url, "streamed query complete");
        }
    }

    /// Stream the answer to `text` into `observer`.
    pub async fn stream_query<O>(&self, text: &str, observer: &mut O)
    where
        O: QueryObserver + ?Sized,
    {
        let mut deltas = std::pin::pin!(self.query_stream(text));
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => observer.on_delta(&delta),
                Err(e) => {
                    observer.on_error(e);
                    return;
                }
            }
        }
        observer.on_complete();
    }

    /// Non-streamed query (`POST /query`); returns the JSON reply.
    pub async fn query(&self, text: &str) -> Result<serde_json::Value, QueryError> {
        let authority = self.resolver.resolve();
        let url = authority.join(QUERY_PATH);
        let request = self
            .authorize(self.http.post(&url))
            .timeout(self.request_timeout)
            .json(&QueryRequest::blocking(text));
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::classify(e, &authority))?;
        let response = ensure_success(response, &url).await?;
        response
            .json()
            .await
            .map_err(|e| QueryError::classify(e, &authority))
    }

    /// `POST /login` with form-encoded credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, QueryError> {
        let authority = self.resolver.resolve();
        let url = authority.join(LOGIN_PATH);
        let request = self
            .authorize(self.http.post(&url))
            .timeout(self.request_timeout)
            .form(&LoginForm { username, password });
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::classify(e, &authority))?;
        let response = ensure_success(response, &url).await?;
        let raw: RawLoginResponse = response
            .json()
            .await
            .map_err(|e| QueryError::classify(e, &authority))?;
        Ok(LoginResponse::from_raw(raw, username))
    }

    /// Whether the backend requires login. When it does not, a guest token is
    /// fetched from `/auth-status`. Never fails: an unreachable backend yields
    /// the default (unconfigured, tokenless) status.
    pub async fn auth_status(&self) -> AuthStatus {
        let health: HealthResponse = match self.get_json(HEALTH_PATH).await {
            Ok(health) => health,
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                return AuthStatus::default();
            }
        };
        let mut status = AuthStatus::from_health(health);
        if !status.auth_configured {
            match self.get_json::<GuestTokenResponse>(AUTH_STATUS_PATH).await {
                Ok(guest) => status.access_token = guest.access_token.filter(|t| !t.is_empty()),
                Err(e) => tracing::debug!(error = %e, "no guest token"),
            }
        }
        status
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueryError> {
        let authority = self.resolver.resolve();
        let url = authority.join(path);
        let response = self
            .authorize(self.http.get(&url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| QueryError::classify(e, &authority))?;
        let response = ensure_success(response, &url).await?;
        response
            .json()
            .await
            .map_err(|e| QueryError::classify(e, &authority))
    }
}

/// Turn a non-success reply into [`QueryError::Status`] carrying its body.
async fn ensure_success(response: Response, url: &str) -> Result<Response, QueryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), url, body = %body, "request rejected");
    Err(QueryError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        deltas: Vec<String>,
        completions: usize,
    }

    impl QueryObserver for Recorder {
        fn on_delta(&mut self, delta: &str) {
            self.deltas.push(delta.to_string());
        }

        fn on_complete(&mut self) {
            self.completions += 1;
        }
    }

    #[test]
    fn status_error_message_names_status_url_and_body() {
        let err = QueryError::Status {
            status: 500,
            url: "http://10.0.0.1:9621/query/stream".into(),
            body: "boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("http://10.0.0.1:9621/query/stream"));
        assert!(msg.contains("boom"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn callbacks_fire_complete_and_error_at_most_once() {
        let mut completions = 0;
        let mut deltas = Vec::new();
        {
            let mut cb = Callbacks::new(|d: &str| deltas.push(d.to_string()))
                .with_complete(|| completions += 1);
            cb.on_delta("a");
            cb.on_delta("b");
            cb.on_complete();
            cb.on_complete();
        }
        assert_eq!(deltas, vec!["a", "b"]);
        assert_eq!(completions, 1);
    }

    #[test]
    fn default_observer_methods_are_optional() {
        let mut rec = Recorder::default();
        rec.on_delta("x");
        rec.on_complete();
        assert_eq!(rec.deltas, vec!["x"]);
        assert_eq!(rec.completions, 1);
    }
}
