pub mod audit_models;
pub mod audit_service;
pub mod audit_store;

pub use audit_models::{AuditRecord, Gw2AuditEvent};
pub use audit_service::{AuditError, AuditService};
pub use audit_store::AuditStore;
