//! API endpoint handlers, one module per resource.

pub mod appointments;
pub mod documents;
pub mod files;
pub mod health;
