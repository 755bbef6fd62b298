//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection`, so callers decide whether
//! it runs inside a transaction.

mod document;
mod patient;
mod stats;

pub use document::*;
pub use patient::*;
pub use stats::*;
