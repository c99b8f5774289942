//! Shared application state.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::services::NoteService;

#[derive(Clone)]
pub struct AppState {
    pub notes: NoteService,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(notes: NoteService, verifier: TokenVerifier) -> Self {
        Self {
            notes,
            verifier: Arc::new(verifier),
        }
    }
}
