//! Data models for jotter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum title length, counted in characters.
pub const MAX_TITLE_CHARS: usize = 100;

// =============================================================================
// NOTE TYPES
// =============================================================================

/// A stored note.
///
/// `owner_id` is stamped from the authenticated caller at creation and never
/// changes afterwards. The only mutation after creation is setting
/// `attachment_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Subject identifier of the owning identity.
    pub owner_id: String,
    /// Display name captured from the token at creation, if any.
    pub owner_display_name: Option<String>,
}

/// Client payload for creating a note.
///
/// Any other field the client sends (ids, owner, attachment URL) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NewNote {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Check the title: required, not blank, at most [`MAX_TITLE_CHARS`]
    /// characters, no control characters. The body may not contain NUL,
    /// which PostgreSQL text columns cannot store.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("Title is required".to_string()));
        }
        if self.title.chars().any(char::is_control) {
            return Err(Error::InvalidInput(
                "Title must not contain control characters".to_string(),
            ));
        }
        if self.content.as_deref().is_some_and(|c| c.contains('\0')) {
            return Err(Error::InvalidInput(
                "Content must not contain NUL characters".to_string(),
            ));
        }
        let len = self.title.chars().count();
        if len > MAX_TITLE_CHARS {
            return Err(Error::InvalidInput(format!(
                "Title must be at most {} characters (got {})",
                MAX_TITLE_CHARS, len
            )));
        }
        Ok(())
    }

    /// Bind the payload to its owner, producing the repository request.
    pub fn into_request(self, owner: &Identity) -> CreateNoteRequest {
        CreateNoteRequest {
            title: self.title,
            content: self.content,
            owner_id: owner.subject.clone(),
            owner_display_name: owner.display_name.clone(),
        }
    }
}

/// Request for inserting a note, already bound to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: Option<String>,
    pub owner_id: String,
    pub owner_display_name: Option<String>,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated caller, as resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier (`sub` claim).
    pub subject: String,
    /// Optional human-readable name.
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// True if this identity owns the note.
    pub fn owns(&self, note: &Note) -> bool {
        note.owner_id == self.subject
    }
}
