pub mod interactions;
pub mod poster;

pub use poster::SerenityCompPoster;
