//! Bearer tokens (HS256 JWT) and argon2 password hashes for the `users`
//! entity, plus the register/login/me handlers and the guard for entity
//! routes.

use super::error::ApiError;
use super::{blocking, present, AppState};
use crate::error::{Error, Result};
use crate::record::{Fields, Record};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Entity that holds accounts.
pub const USERS: &str = "users";
const DEFAULT_ROLE: &str = "user";

/// Token settings for the server.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub secret: String,
    /// `iss` claim written and required.
    pub issuer: String,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
    /// Entity routes reject requests without a valid token.
    pub require_auth: bool,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// User role at issue time.
    pub role: String,
    /// Issuer.
    pub iss: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Sign a token for `user`.
pub fn issue_token(user: &Record, config: &AuthConfig) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.clone(),
        role: user.str_field("role").unwrap_or(DEFAULT_ROLE).to_string(),
        iss: config.issuer.clone(),
        iat: now,
        exp: now + config.ttl_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| Error::Serialize(format!("jwt encode: {e}")))
}

/// Check signature, issuer and expiry, returning the claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            Error::Unauthorized("Token expired".into())
        }
        _ => Error::Unauthorized("Invalid token".into()),
    })
}

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Serialize(format!("password hash: {e}")))
}

/// `Ok(false)` on a wrong password, an error only for a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| Error::Deserialize(format!("stored password hash: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Deserialize(format!("password verify: {e}"))),
    }
}

/// Replace a plain `password` in a users payload with its hash. A
/// `password_hash` sent by the caller is never taken as is.
pub(crate) fn hash_password_field(fields: &mut Fields) -> Result<()> {
    fields.remove("password_hash");
    match fields.remove("password") {
        Some(Value::String(password)) if !password.is_empty() => {
            fields.insert("password_hash".into(), Value::String(hash_password(&password)?));
            Ok(())
        }
        Some(Value::Null) | None => Ok(()),
        Some(_) => Err(Error::BadInput("password must be a non-empty string".into())),
    }
}

fn bearer(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Unauthorized("Missing bearer token".into()))
}

/// Middleware for entity routes: when auth is required, the request must
/// carry a valid token. The claims are handed on as a request extension.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if !state.auth.require_auth {
        return Ok(next.run(request).await);
    }
    let claims = validate_token(bearer(request.headers())?, &state.auth)?;
    debug!(user = %claims.sub, "authenticated");
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Body of `POST /api/auth/login`. Either field may hold a username or an
/// email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username, or an email.
    #[serde(default)]
    pub username: Option<String>,
    /// Email, or a username.
    #[serde(default)]
    pub email: Option<String>,
    /// Plain-text password.
    pub password: String,
}

fn session(user: Record, config: &AuthConfig) -> Result<Value> {
    let token = issue_token(&user, config)?;
    Ok(json!({ "token": token, "user": present(USERS, user) }))
}

fn required_text<'a>(fields: &'a Fields, key: &str) -> Result<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::BadInput(format!("{key} is required")))
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> std::result::Result<Response, ApiError> {
    let mut fields = super::routes::parse_object(&body)?;
    let config = state.auth.clone();
    let lock = state.register_lock.clone();
    let body = blocking(&state, move |store| {
        let username = required_text(&fields, "username")?.to_string();
        let email = required_text(&fields, "email")?.to_string();
        required_text(&fields, "password")?;
        fields
            .entry("role")
            .or_insert_with(|| Value::String(DEFAULT_ROLE.into()));
        hash_password_field(&mut fields)?;

        let _guard = lock.lock();
        let taken = store.list(USERS)?.into_iter().any(|u| {
            u.str_field("username") == Some(username.as_str())
                || u.str_field("email") == Some(email.as_str())
        });
        if taken {
            return Err(Error::BadInput("User already exists".into()));
        }
        let user = store.create(USERS, fields)?;
        info!(user = %user.id, "registered");
        session(user, &config)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// `POST /api/auth/login` with a username or an email.
pub async fn login(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::BadInput(format!("invalid login request: {e}")))?;
    let login = request
        .username
        .or(request.email)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::BadInput("username or email is required".into()))?;
    let config = state.auth.clone();
    let body = blocking(&state, move |store| {
        let invalid = || Error::Unauthorized("Invalid credentials".into());
        let user = store
            .list(USERS)?
            .into_iter()
            .find(|u| {
                u.str_field("username") == Some(login.as_str())
                    || u.str_field("email") == Some(login.as_str())
            })
            .ok_or_else(invalid)?;
        let hash = user.str_field("password_hash").ok_or_else(invalid)?;
        if !verify_password(&request.password, hash)? {
            return Err(invalid());
        }
        debug!(user = %user.id, "logged in");
        session(user, &config)
    })
    .await?;
    Ok(Json(body))
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> std::result::Result<Json<Value>, ApiError> {
    let claims = validate_token(bearer(&headers)?, &state.auth)?;
    let user = blocking(&state, move |store| {
        store
            .get(USERS, &claims.sub)?
            .ok_or_else(|| Error::not_found(USERS, &claims.sub))
    })
    .await?;
    Ok(Json(present(USERS, user)))
}
