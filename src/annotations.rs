// src/annotations.rs

use crate::clock::{Clock, SystemClock};
use crate::events::{EventBus, TrackerEvent};
use crate::models::{Bookmark, Note, TOTAL_PAGES};
use crate::state_manager::{StateError, StateManager};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const BOOKMARK_COLLECTION: &str = "bookmarks";
const NOTE_COLLECTION: &str = "notes";

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("state manager error: {0}")]
    State(#[from] StateError),
    #[error("note {0} not found")]
    NoteNotFound(Uuid),
    #[error("page {0} is outside 1..=604")]
    InvalidPage(u16),
}

fn bookmark_key(page: u16) -> String {
    format!("{page:03}")
}

/// Bookmarks, page notes and free-standing reflections.
#[derive(Clone)]
pub struct Annotations {
    store: StateManager,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl Annotations {
    pub fn new(store: StateManager, events: EventBus) -> Self {
        Self::with_clock(store, events, Arc::new(SystemClock))
    }

    pub fn with_clock(store: StateManager, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, events }
    }

    fn check_page(page: u16) -> Result<u16, AnnotationError> {
        if (1..=TOTAL_PAGES).contains(&page) {
            Ok(page)
        } else {
            Err(AnnotationError::InvalidPage(page))
        }
    }

    /// Bookmarks a page, replacing the label of an existing bookmark.
    pub async fn add_bookmark(
        &self,
        page: u16,
        label: Option<String>,
    ) -> Result<Bookmark, AnnotationError> {
        let page = Self::check_page(page)?;
        let bookmark = Bookmark {
            page,
            label,
            created_at: self.clock.now(),
        };
        self.store
            .set(BOOKMARK_COLLECTION, &bookmark_key(page), &bookmark)
            .await?;
        self.events.publish(TrackerEvent::Changed);
        Ok(bookmark)
    }

    /// Returns whether a bookmark was removed.
    pub async fn remove_bookmark(&self, page: u16) -> Result<bool, AnnotationError> {
        let removed = self
            .store
            .delete(BOOKMARK_COLLECTION, &bookmark_key(page))
            .await?;
        if removed {
            self.events.publish(TrackerEvent::Changed);
        }
        Ok(removed)
    }

    pub async fn is_bookmarked(&self, page: u16) -> Result<bool, AnnotationError> {
        let bookmark: Option<Bookmark> = self
            .store
            .get(BOOKMARK_COLLECTION, &bookmark_key(page))
            .await?;
        Ok(bookmark.is_some())
    }

    /// All bookmarks ordered by page.
    pub async fn bookmarks(&self) -> Result<Vec<Bookmark>, AnnotationError> {
        Ok(self.store.list(BOOKMARK_COLLECTION).await?)
    }

    /// Adds a note. A note without a page is a journal entry.
    pub async fn add_note(&self, page: Option<u16>, text: &str) -> Result<Note, AnnotationError> {
        if let Some(page) = page {
            Self::check_page(page)?;
        }
        let note = Note::new(page, text.to_owned(), self.clock.now());
        self.store
            .set(NOTE_COLLECTION, &note.id.to_string(), &note)
            .await?;
        self.events.publish(TrackerEvent::Changed);
        Ok(note)
    }

    pub async fn update_note(&self, id: Uuid, text: &str) -> Result<Note, AnnotationError> {
        let mut note: Note = self
            .store
            .get(NOTE_COLLECTION, &id.to_string())
            .await?
            .ok_or(AnnotationError::NoteNotFound(id))?;
        note.text = text.to_owned();
        note.updated_at = self.clock.now();
        self.store.set(NOTE_COLLECTION, &id.to_string(), &note).await?;
        self.events.publish(TrackerEvent::Changed);
        Ok(note)
    }

    pub async fn delete_note(&self, id: Uuid) -> Result<bool, AnnotationError> {
        let removed = self.store.delete(NOTE_COLLECTION, &id.to_string()).await?;
        if removed {
            self.events.publish(TrackerEvent::Changed);
        }
        Ok(removed)
    }

    /// Notes on one page, oldest first.
    pub async fn notes_for_page(&self, page: u16) -> Result<Vec<Note>, AnnotationError> {
        let mut notes: Vec<Note> = self.store.list(NOTE_COLLECTION).await?;
        notes.retain(|n| n.page == Some(page));
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    /// Journal entries, newest first.
    pub async fn journal(&self) -> Result<Vec<Note>, AnnotationError> {
        let mut notes: Vec<Note> = self.store.list(NOTE_COLLECTION).await?;
        notes.retain(Note::is_journal_entry);
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }
}
