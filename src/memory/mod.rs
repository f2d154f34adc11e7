// src/memory/mod.rs

//! The memory lifecycle: recall → apply → decide → learn.
//!
//! - Types: memory records, rule payloads, audit trail
//! - Traits: repository abstraction (no SQL in business logic)
//! - Stages: recall, apply, decide, learn, bootstrap
//! - Storage: SQLite backend

pub mod apply;
pub mod bootstrap;
pub mod decide;
pub mod learn;
pub mod recall;
pub mod sqlite;
pub mod traits;
pub mod types;
