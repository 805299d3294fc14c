//! Domain model for funccount
//!
//! Core domain types and errors:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Location, Pid, ProbeKind};

pub use errors::{FuncCountError, Result};
