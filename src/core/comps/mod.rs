pub mod comp_models;
pub mod comp_poster;
pub mod comp_service;
pub mod comp_store;
pub mod render;
pub mod schedule;
pub mod signups;

pub use comp_models::{CompState, CompositionSchedule, Preset, RosterDefinition};
pub use comp_poster::{CompPoster, PostError};
pub use comp_service::{CompError, CompService, ScheduleInput, ScheduleUpdate};
pub use comp_store::CompStore;
pub use render::{CompositionView, Selection};
