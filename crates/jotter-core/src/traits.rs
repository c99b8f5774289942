//! Core traits for jotter abstractions.
//!
//! Concrete implementations live in `jotter-db`; the API layer only sees the
//! trait, which keeps the ownership logic testable without a database.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CreateNoteRequest, Note};

/// Repository for note persistence.
///
/// Implementations do not check ownership. Callers resolve the identity and
/// compare it against `Note::owner_id`.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note, assigning its id and timestamps.
    async fn insert(&self, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch a note by id. Returns `Error::NoteNotFound` if absent.
    async fn fetch(&self, id: Uuid) -> Result<Note>;

    /// List every note owned by `owner_id`.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Note>>;

    /// Record an attachment URL on a note and bump `updated_at`.
    async fn set_attachment_url(&self, id: Uuid, url: &str) -> Result<Note>;
}
