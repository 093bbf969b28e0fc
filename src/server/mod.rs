//! The REST surface over any [`Store`].
//!
//! Entity routes are mounted twice, under `/api` and under `/api/data`, so
//! clients written for either layout work against the same server.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::Store;
use axum::routing::{get, post};
use axum::{middleware, Router};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod auth;
pub mod error;
mod routes;

pub use auth::AuthConfig;
pub use error::ApiError;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Backing store.
    pub store: Arc<dyn Store>,
    /// Token settings.
    pub auth: Arc<AuthConfig>,
    register_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// State over `store` with `auth` settings.
    pub fn new(store: Arc<dyn Store>, auth: AuthConfig) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
            register_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("require_auth", &self.auth.require_auth)
            .finish_non_exhaustive()
    }
}

/// Run store work on the blocking pool; stores do file i/o and password
/// hashing is slow on purpose.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| ApiError(Error::Io(format!("store task failed: {e}"))))?
        .map_err(ApiError)
}

/// A record as it goes out on the wire. Password hashes never leave.
pub(crate) fn present(entity: &str, record: Record) -> Value {
    let mut value = record.to_value();
    if entity == auth::USERS {
        if let Value::Object(map) = &mut value {
            map.remove("password_hash");
            map.remove("password");
        }
    }
    value
}

fn entity_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/{entity}", get(routes::list).post(routes::create))
        .route("/{entity}/bulk-delete", post(routes::bulk_delete))
        .route(
            "/{entity}/{id}",
            get(routes::get_one)
                .put(routes::update)
                .delete(routes::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
}

/// The full application router.
pub fn router(state: AppState) -> Router {
    let entities = entity_routes(&state);
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/data",
            get(routes::dataset).route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_bearer,
            )),
        )
        .nest("/api/data", entities.clone())
        .nest("/api", entities)
        .fallback(routes::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the configured store and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: Config) -> Result<()> {
    let store = config.open_store()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    serve_on(listener, Arc::clone(&store), config.auth(), shutdown_signal()).await?;
    store.flush()?;
    info!("server stopped");
    Ok(())
}

/// Serve `store` on an already bound listener until `shutdown` resolves.
pub async fn serve_on<F>(
    listener: TcpListener,
    store: Arc<dyn Store>,
    auth: AuthConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(AppState::new(store, auth));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
