pub mod update_notes_models;
pub mod update_notes_service;
pub mod update_notes_store;

pub use update_notes_models::{UpdateNotesPost, UpdateNotesStatus};
pub use update_notes_service::{UpdateNotesError, UpdateNotesService};
pub use update_notes_store::UpdateNotesStore;
