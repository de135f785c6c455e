pub mod build_models;
pub mod build_service;
pub mod build_store;

pub use build_models::{BuildInput, BuildPostLocation, BuildRecord};
pub use build_service::{BuildError, BuildService};
pub use build_store::BuildStore;
