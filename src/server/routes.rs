use super::auth::{hash_password_field, USERS};
use super::error::ApiError;
use super::{blocking, present, AppState};
use crate::error::{Error, Result};
use crate::record::{Fields, SortKey};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    pub ids: Vec<String>,
}

/// Request body as a JSON object.
pub(crate) fn parse_object(body: &[u8]) -> Result<Fields> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(Error::BadInput(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
        Err(e) => Err(Error::BadInput(format!("malformed JSON: {e}"))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// `GET /api/data`: every entity at once.
pub async fn dataset(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let data = blocking(&state, |store| store.snapshot()).await?;
    let body: serde_json::Map<String, Value> = data
        .into_iter()
        .map(|(entity, records)| {
            let list = records.into_iter().map(|r| present(&entity, r)).collect();
            (entity, Value::Array(list))
        })
        .collect();
    Ok(Json(Value::Object(body)))
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let sort = query.sort.as_deref().and_then(SortKey::parse);
    let name = entity.clone();
    let records = blocking(&state, move |store| store.list_sorted(&name, sort.as_ref())).await?;
    Ok(Json(records.into_iter().map(|r| present(&entity, r)).collect()))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let name = entity.clone();
    let record = blocking(&state, move |store| {
        store
            .get(&name, &id)?
            .ok_or_else(|| Error::not_found(&name, &id))
    })
    .await?;
    Ok(Json(present(&entity, record)))
}

pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let mut fields = parse_object(&body)?;
    let name = entity.clone();
    let record = blocking(&state, move |store| {
        if name == USERS {
            hash_password_field(&mut fields)?;
        }
        store.create(&name, fields)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(present(&entity, record))).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let mut fields = parse_object(&body)?;
    let name = entity.clone();
    let record = blocking(&state, move |store| {
        if name == USERS {
            hash_password_field(&mut fields)?;
        }
        store.update(&name, &id, fields)
    })
    .await?;
    Ok(Json(present(&entity, record)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    blocking(&state, move |store| store.delete(&entity, &id)).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: BulkDelete = serde_json::from_slice(&body)
        .map_err(|e| Error::BadInput(format!("expected {{\"ids\": [..]}}: {e}")))?;
    let deleted = blocking(&state, move |store| store.bulk_delete(&entity, &request.ids)).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" }))).into_response()
}
