pub mod events;

pub use events::report;
