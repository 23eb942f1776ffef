//! Resource route handlers.
//!
//! One set of handlers serves every catalog resource:
//! `GET/POST /api/{resource}` and `GET/PATCH/DELETE /api/{resource}/{id}`.
//! Write bodies are JSON objects or multipart forms carrying files.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, RawQuery, Request, State},
    http::{StatusCode, header},
    routing::get,
};
use serde_json::Value;
use tracing::debug;

use crate::content::{Deleted, Resource, ResourceInput};
use crate::error::{AppError, AppResult};
use crate::file::Upload;
use crate::middleware::CurrentUser;
use crate::query::{PaginatedResult, QueryRequest};
use crate::state::AppState;

/// Largest accepted request body; room for a couple of full-size files.
pub const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

/// Create the resource router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/{resource}", get(list).post(create))
        .route(
            "/api/{resource}/{id}",
            get(detail).patch(update).delete(remove),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
}

fn resource<'s>(state: &'s AppState, slug: &str) -> AppResult<&'s Resource> {
    state
        .catalog()
        .get(slug)
        .ok_or_else(|| AppError::NotFound(format!("unknown resource '{slug}'")))
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id '{raw}'")))
}

async fn list(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
    user: CurrentUser,
) -> AppResult<Json<PaginatedResult<Value>>> {
    let resource = resource(&state, &slug)?;
    if !resource.definition.access.public_read() {
        user.require()?;
    }

    let request = QueryRequest::from_query_string(query.as_deref().unwrap_or(""));
    let page = state.resources().list(resource, &request).await?;
    Ok(Json(page))
}

async fn detail(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let resource = resource(&state, &slug)?;
    if !resource.definition.access.public_read() {
        user.require()?;
    }
    let id = parse_id(&id)?;

    Ok(Json(state.resources().get(resource, id).await?))
}

async fn create(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
    request: Request,
) -> AppResult<(StatusCode, Json<Value>)> {
    let resource = resource(&state, &slug)?;
    let owner = if resource.definition.access.public_create() {
        user.0.map(|u| u.id)
    } else {
        Some(user.require()?.id)
    };

    let input = read_input(request).await?;
    let row = state.resources().create(resource, &input, owner).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn update(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    user: CurrentUser,
    request: Request,
) -> AppResult<Json<Value>> {
    let resource = resource(&state, &slug)?;
    user.require()?;
    let id = parse_id(&id)?;

    let input = read_input(request).await?;
    Ok(Json(state.resources().update(resource, id, &input).await?))
}

async fn remove(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    user: CurrentUser,
) -> AppResult<Json<Deleted>> {
    let resource = resource(&state, &slug)?;
    user.require()?;
    let id = parse_id(&id)?;

    Ok(Json(state.resources().delete(resource, id).await?))
}

/// Parse a write body as multipart or JSON depending on its content type.
async fn read_input(request: Request) -> AppResult<ResourceInput> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Json(body) = Json::<Value>::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        return Ok(ResourceInput::from_json(body)?);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut parts = Vec::new();
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }

        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part for a file input left blank.
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                uploads.push(Upload {
                    field: name,
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            None => {
                let text = field.text().await.map_err(multipart_error)?;
                parts.push((name, text));
            }
        }
    }

    debug!(fields = parts.len(), files = uploads.len(), "multipart body read");
    Ok(ResourceInput::from_parts(parts, uploads))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
