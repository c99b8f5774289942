//! Note endpoints. All require a bearer token.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use jotter_core::{NewNote, Note};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::services::Upload;
use crate::state::AppState;

/// Multipart field carrying the attachment.
pub const UPLOAD_FIELD: &str = "file";

/// List the caller's notes.
#[utoipa::path(
    get,
    path = "/notes",
    tag = "Notes",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Notes owned by the caller", body = [Note]),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_notes(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<Vec<Note>>, ApiError> {
    let notes = state.notes.list(&identity).await?;
    Ok(Json(notes))
}

/// Get one note.
#[utoipa::path(
    get,
    path = "/notes/{id}",
    tag = "Notes",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 200, description = "The note", body = Note),
        (status = 400, description = "Malformed note ID"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Note belongs to another user"),
        (status = 404, description = "No such note")
    )
)]
pub async fn get_note(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Note>, ApiError> {
    let Path(id) = id?;
    let note = state.notes.get(id, &identity).await?;
    Ok(Json(note))
}

/// Create a note owned by the caller.
#[utoipa::path(
    post,
    path = "/notes",
    tag = "Notes",
    security(("bearer" = [])),
    request_body = NewNote,
    responses(
        (status = 201, description = "Created", body = Note),
        (status = 400, description = "Invalid title or body"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_note(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    payload: Result<Json<NewNote>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let Json(new_note) = payload?;
    let note = state.notes.create(new_note, &identity).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// Read the `file` field of a multipart body. Other fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        return Ok(Some(Upload {
            filename,
            content_type,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

/// Upload the note's attachment; responds with its public URL as text.
#[utoipa::path(
    post,
    path = "/notes/{id}/upload",
    tag = "Notes",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Note ID")),
    request_body(content = String, content_type = "multipart/form-data", description = "Multipart form with a `file` field"),
    responses(
        (status = 200, description = "Public URL of the stored file", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing, empty or unreadable file"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Note belongs to another user"),
        (status = 404, description = "No such note"),
        (status = 503, description = "Object storage unavailable")
    )
)]
pub async fn upload_attachment(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let file = read_upload(multipart?).await?;
    let url = state.notes.upload_attachment(id, file, &identity).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], url))
}
