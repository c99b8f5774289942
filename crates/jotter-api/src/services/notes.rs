//! Note operations scoped to the authenticated caller.
//!
//! Every operation takes the caller's [`Identity`]. Reads and writes of a
//! single note go through [`NoteService::ensure_owner`], so another user's
//! note is reported as Forbidden and never returned.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use jotter_core::{Error, Identity, NewNote, Note, NoteRepository, Result};
use jotter_storage::{generate_storage_key, ObjectStore, DEFAULT_CONTENT_TYPE};

/// A file received for upload.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Clone)]
pub struct NoteService {
    notes: Arc<dyn NoteRepository>,
    storage: Arc<dyn ObjectStore>,
}

impl NoteService {
    pub fn new(notes: Arc<dyn NoteRepository>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { notes, storage }
    }

    /// Forbidden unless `identity` owns `note`.
    pub fn ensure_owner(note: &Note, identity: &Identity) -> Result<()> {
        if identity.owns(note) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "Note {} belongs to another user",
                note.id
            )))
        }
    }

    pub async fn list(&self, identity: &Identity) -> Result<Vec<Note>> {
        self.notes.list_by_owner(&identity.subject).await
    }

    /// Fetch a note the caller owns.
    pub async fn get(&self, id: Uuid, identity: &Identity) -> Result<Note> {
        let note = self.notes.fetch(id).await?;
        if let Err(e) = Self::ensure_owner(&note, identity) {
            warn!(
                subsystem = "api",
                component = "notes",
                note_id = %id,
                owner_id = %identity.subject,
                "Access to another user's note denied"
            );
            return Err(e);
        }
        Ok(note)
    }

    pub async fn create(&self, new_note: NewNote, identity: &Identity) -> Result<Note> {
        new_note.validate()?;
        let note = self.notes.insert(new_note.into_request(identity)).await?;
        info!(
            subsystem = "api",
            component = "notes",
            op = "create",
            note_id = %note.id,
            owner_id = %identity.subject,
            "Note created"
        );
        Ok(note)
    }

    /// Store `file` as the note's attachment and return its public URL.
    ///
    /// Ownership is checked first, then the payload; storage is only
    /// contacted for a non-empty file on an owned note.
    pub async fn upload_attachment(
        &self,
        id: Uuid,
        file: Option<Upload>,
        identity: &Identity,
    ) -> Result<String> {
        let start = Instant::now();
        self.get(id, identity).await?;

        let file = file.ok_or_else(|| {
            Error::InvalidInput("No file uploaded; send it in the multipart field 'file'".into())
        })?;
        if file.data.is_empty() {
            return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
        }

        let key = generate_storage_key(file.filename.as_deref());
        let content_type = file
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let url = self
            .storage
            .put_object(&key, &file.data, content_type)
            .await?;
        self.notes.set_attachment_url(id, &url).await?;

        info!(
            subsystem = "api",
            component = "notes",
            op = "upload",
            note_id = %id,
            owner_id = %identity.subject,
            storage_key = %key,
            backend = self.storage.backend_name(),
            size_bytes = file.data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Attachment uploaded"
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jotter_db::MemoryNoteRepository;
    use jotter_storage::MemoryObjectStore;

    fn service_with(store: MemoryObjectStore) -> (NoteService, MemoryNoteRepository) {
        let repo = MemoryNoteRepository::new();
        let service = NoteService::new(Arc::new(repo.clone()), Arc::new(store));
        (service, repo)
    }

    fn alice() -> Identity {
        Identity::new("alice-sub").with_display_name("alice")
    }

    fn bob() -> Identity {
        Identity::new("bob-sub")
    }

    #[tokio::test]
    async fn test_create_stamps_owner_from_identity() {
        let (service, _) = service_with(MemoryObjectStore::new());
        let note = service
            .create(NewNote::new("Groceries").with_content("milk"), &alice())
            .await
            .unwrap();

        assert_eq!(note.owner_id, "alice-sub");
        assert_eq!(note.owner_display_name.as_deref(), Some("alice"));
        assert_eq!(note.content.as_deref(), Some("milk"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_title_without_persisting() {
        let (service, repo) = service_with(MemoryObjectStore::new());

        let err = service
            .create(NewNote::new("x".repeat(101)), &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = service.create(NewNote::new("   "), &alice()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_caller() {
        let (service, _) = service_with(MemoryObjectStore::new());
        service.create(NewNote::new("a"), &alice()).await.unwrap();
        service.create(NewNote::new("b"), &bob()).await.unwrap();

        let notes = service.list(&alice()).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "a");
    }

    #[tokio::test]
    async fn test_get_distinguishes_missing_from_foreign() {
        let (service, _) = service_with(MemoryObjectStore::new());
        let note = service.create(NewNote::new("mine"), &alice()).await.unwrap();

        let err = service.get(note.id, &bob()).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let err = service.get(Uuid::now_v7(), &alice()).await.unwrap_err();
        assert!(matches!(err, Error::NoteNotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_persists_url() {
        let store = MemoryObjectStore::new();
        let (service, _) = service_with(store.clone());
        let note = service.create(NewNote::new("doc"), &alice()).await.unwrap();

        let url = service
            .upload_attachment(
                note.id,
                Some(Upload::new(b"data".to_vec()).with_filename("my report.pdf")),
                &alice(),
            )
            .await
            .unwrap();

        let key = url.strip_prefix("memory://").unwrap();
        assert!(key.ends_with("_my_report.pdf"));
        let stored = store.get(key).await.unwrap();
        assert_eq!(stored.data, b"data");
        assert_eq!(stored.content_type, DEFAULT_CONTENT_TYPE);

        let reloaded = service.get(note.id, &alice()).await.unwrap();
        assert_eq!(reloaded.attachment_url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_upload_rejections_never_reach_storage() {
        let store = MemoryObjectStore::new();
        let (service, _) = service_with(store.clone());
        let note = service.create(NewNote::new("doc"), &alice()).await.unwrap();

        let empty = service
            .upload_attachment(note.id, Some(Upload::new(Vec::new())), &alice())
            .await
            .unwrap_err();
        assert!(matches!(empty, Error::InvalidInput(_)));

        let missing = service
            .upload_attachment(note.id, None, &alice())
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::InvalidInput(_)));

        let foreign = service
            .upload_attachment(note.id, Some(Upload::new(b"x".to_vec())), &bob())
            .await
            .unwrap_err();
        assert!(matches!(foreign, Error::Forbidden(_)));

        let unknown = service
            .upload_attachment(Uuid::now_v7(), Some(Upload::new(b"x".to_vec())), &alice())
            .await
            .unwrap_err();
        assert!(matches!(unknown, Error::NoteNotFound(_)));

        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_note_unchanged() {
        let (service, _) = service_with(MemoryObjectStore::failing());
        let note = service.create(NewNote::new("doc"), &alice()).await.unwrap();

        let err = service
            .upload_attachment(note.id, Some(Upload::new(b"x".to_vec())), &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));

        let reloaded = service.get(note.id, &alice()).await.unwrap();
        assert!(reloaded.attachment_url.is_none());
    }

    #[test]
    fn test_ensure_owner() {
        let now = chrono::Utc::now();
        let note = Note {
            id: Uuid::now_v7(),
            title: "t".into(),
            content: None,
            attachment_url: None,
            created_at: now,
            updated_at: now,
            owner_id: "alice-sub".into(),
            owner_display_name: None,
        };
        assert!(NoteService::ensure_owner(&note, &alice()).is_ok());
        assert!(matches!(
            NoteService::ensure_owner(&note, &bob()),
            Err(Error::Forbidden(_))
        ));
    }
}
