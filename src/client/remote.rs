//! [`Remote`] implementations: the HTTP API, a store in the same process,
//! and a remote that is never there.

use super::{sorted, Remote, RemoteError, RemoteResult};
use crate::error::{Error, Result};
use crate::record::{Fields, Record, SortKey};
use crate::store::Store;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Which path prefix the server mounts entity routes under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiLayout {
    /// `/api/<entity>`
    #[default]
    Flat,
    /// `/api/data/<entity>`
    Data,
}

impl ApiLayout {
    fn prefix(self) -> &'static [&'static str] {
        match self {
            ApiLayout::Flat => &["api"],
            ApiLayout::Data => &["api", "data"],
        }
    }
}

/// Token and profile returned by login and register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for later requests.
    pub token: String,
    /// The signed-in user's profile.
    pub user: Record,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to the HTTP API with reqwest.
pub struct HttpRemote {
    http: reqwest::Client,
    base: Url,
    layout: ApiLayout,
    token: RwLock<Option<String>>,
}

impl HttpRemote {
    /// Remote at `base_url` (e.g. `http://localhost:3001`) using the flat
    /// layout and a 30 second request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Remote with an explicit per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let raw = base_url.into();
        let base = Url::parse(&raw).map_err(|e| Error::Config(format!("remote url `{raw}`: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("remote url `{raw}` cannot hold paths")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base,
            layout: ApiLayout::Flat,
            token: RwLock::new(None),
        })
    }

    /// Use a different route layout.
    pub fn layout(mut self, layout: ApiLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Send `Authorization: Bearer <token>` from now on (or stop, with
    /// `None`).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// The bearer token in use.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Log in with a username or email. The returned token is kept for later
    /// calls.
    pub async fn login(&self, login: &str, password: &str) -> RemoteResult<AuthSession> {
        let body = json!({ "username": login, "password": password });
        let request = self.http.post(self.endpoint(&["api", "auth", "login"])).json(&body);
        let response = self.send(request, "users", login).await?;
        self.start_session(response).await
    }

    /// Register a user. `fields` must carry `username`, `email` and
    /// `password`; the returned token is kept for later calls.
    pub async fn register(&self, fields: Fields) -> RemoteResult<AuthSession> {
        let request = self
            .http
            .post(self.endpoint(&["api", "auth", "register"]))
            .json(&fields);
        let response = self.send(request, "users", "").await?;
        self.start_session(response).await
    }

    /// Profile of the user the current token belongs to.
    pub async fn me(&self) -> RemoteResult<Record> {
        let request = self.http.get(self.endpoint(&["api", "auth", "me"]));
        let response = self.send(request, "users", "me").await?;
        read_json(response).await
    }

    async fn start_session(&self, response: Response) -> RemoteResult<AuthSession> {
        let session: AuthSession = read_json(response).await?;
        self.set_token(Some(session.token.clone()));
        debug!(user = %session.user.id, "session started");
        Ok(session)
    }

    /// `segments` appended to the base path, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn url(&self, entity: &str, id: Option<&str>) -> Url {
        let mut segments: Vec<&str> = self.layout.prefix().to_vec();
        segments.push(entity);
        segments.extend(id);
        self.endpoint(&segments)
    }

    fn list_request(&self, entity: &str, sort: Option<&SortKey>) -> RequestBuilder {
        let request = self.http.get(self.url(entity, None));
        match sort {
            Some(key) => request.query(&[("sort", key.to_string())]),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, entity: &str, id: &str) -> RemoteResult<Response> {
        let request = match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(classify(status, message, entity, id))
    }
}

fn classify(status: StatusCode, message: String, entity: &str, id: &str) -> RemoteError {
    if status.is_server_error() {
        return RemoteError::Unavailable(format!("{status}: {message}"));
    }
    let error = match status {
        StatusCode::NOT_FOUND => Error::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        _ => Error::BadInput(message),
    };
    RemoteError::Rejected(error)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Unavailable(format!("unreadable response: {e}")))
}

impl Remote for HttpRemote {
    async fn list(&self, entity: &str, sort: Option<&SortKey>) -> RemoteResult<Vec<Record>> {
        let response = self.send(self.list_request(entity, sort), entity, "").await?;
        read_json(response).await
    }

    async fn get(&self, entity: &str, id: &str) -> RemoteResult<Option<Record>> {
        let request = self.http.get(self.url(entity, Some(id)));
        match self.send(request, entity, id).await {
            Ok(response) => read_json(response).await.map(Some),
            Err(RemoteError::Rejected(Error::NotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, entity: &str, fields: Fields) -> RemoteResult<Record> {
        let request = self.http.post(self.url(entity, None)).json(&fields);
        let response = self.send(request, entity, "").await?;
        read_json(response).await
    }

    async fn update(&self, entity: &str, id: &str, fields: Fields) -> RemoteResult<Record> {
        let request = self.http.put(self.url(entity, Some(id))).json(&fields);
        let response = self.send(request, entity, id).await?;
        read_json(response).await
    }

    async fn delete(&self, entity: &str, id: &str) -> RemoteResult<()> {
        let request = self.http.delete(self.url(entity, Some(id)));
        let response = self.send(request, entity, id).await?;
        let _: Value = read_json(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base", &self.base.as_str())
            .field("layout", &self.layout)
            .field("authenticated", &self.token.read().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InProcess
// ---------------------------------------------------------------------------

/// A store in this process used as the remote tier.
///
/// Storage failures (i/o, encoding) count as the remote being unavailable,
/// the way a 500 from the HTTP API would. [`set_reachable`](Self::set_reachable)
/// simulates an outage.
#[derive(Debug)]
pub struct InProcess<S> {
    store: S,
    reachable: AtomicBool,
}

impl<S: Store> InProcess<S> {
    /// Serve `store` as a remote.
    pub fn new(store: S) -> Self {
        Self {
            store,
            reachable: AtomicBool::new(true),
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Take the remote down (`false`) or bring it back.
    pub fn set_reachable(&self, yes: bool) {
        self.reachable.store(yes, Ordering::Relaxed);
    }

    fn call<T>(&self, f: impl FnOnce(&S) -> Result<T>) -> RemoteResult<T> {
        if !self.reachable.load(Ordering::Relaxed) {
            return Err(RemoteError::Unavailable("in-process remote is unreachable".into()));
        }
        f(&self.store).map_err(|e| match e {
            Error::Io(_) | Error::Serialize(_) | Error::Deserialize(_) => {
                RemoteError::Unavailable(e.to_string())
            }
            other => RemoteError::Rejected(other),
        })
    }
}

impl<S: Store> Remote for InProcess<S> {
    async fn list(&self, entity: &str, sort: Option<&SortKey>) -> RemoteResult<Vec<Record>> {
        self.call(|s| s.list(entity)).map(|records| sorted(records, sort))
    }

    async fn get(&self, entity: &str, id: &str) -> RemoteResult<Option<Record>> {
        self.call(|s| s.get(entity, id))
    }

    async fn create(&self, entity: &str, fields: Fields) -> RemoteResult<Record> {
        self.call(|s| s.create(entity, fields))
    }

    async fn update(&self, entity: &str, id: &str, fields: Fields) -> RemoteResult<Record> {
        self.call(|s| s.update(entity, id, fields))
    }

    async fn delete(&self, entity: &str, id: &str) -> RemoteResult<()> {
        self.call(|s| s.delete(entity, id))
    }
}

// ---------------------------------------------------------------------------
// Offline
// ---------------------------------------------------------------------------

/// A remote that is always unavailable, for pure local mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

fn offline<T>() -> RemoteResult<T> {
    Err(RemoteError::Unavailable("offline".into()))
}

impl Remote for Offline {
    async fn list(&self, _entity: &str, _sort: Option<&SortKey>) -> RemoteResult<Vec<Record>> {
        offline()
    }

    async fn get(&self, _entity: &str, _id: &str) -> RemoteResult<Option<Record>> {
        offline()
    }

    async fn create(&self, _entity: &str, _fields: Fields) -> RemoteResult<Record> {
        offline()
    }

    async fn update(&self, _entity: &str, _id: &str, _fields: Fields) -> RemoteResult<Record> {
        offline()
    }

    async fn delete(&self, _entity: &str, _id: &str) -> RemoteResult<()> {
        offline()
    }
}
