//! Instrumentation: the aya-backed counting collaborator
//!
//! - `ebpf_setup`: load the counting object and attach slot programs
//! - `counters`: read and zero the per-location counts

pub mod counters;
pub mod ebpf_setup;

pub use counters::{CountSnapshot, CounterHandle, CounterSource};
pub use ebpf_setup::{attach_counters, load_ebpf_program, plan_attach, AttachPoint, PlannedAttach};
