// src/lib.rs

pub mod config;
pub mod engine;
pub mod invoice;
pub mod memory;

// Re-export the surface most callers need.
pub use config::EngineConfig;
pub use engine::MemoryEngine;
pub use invoice::{HumanCorrection, HumanFeedback, Invoice, InvoiceFields, LineItem};
pub use memory::traits::MemoryRepository;
pub use memory::types::{
    AuditEntry, AuditStep, InvoiceResolution, Memory, MemoryType, MemoryValue, ProcessOutcome,
};
