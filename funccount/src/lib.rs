//! # funccount - Count Function Calls with eBPF
//!
//! Counts calls to kernel functions, user-space library functions, kernel
//! tracepoints, or USDT probes whose names match a pattern, and prints a
//! per-function table every interval.
//!
//! ## Architecture Overview
//!
//! ```text
//! PATTERN ──▶ probe::ProbeSpec ──▶ probe::Probe (MatchTable, locations 0..N)
//!                                        │ discovery::Discovery
//!                                        ▼
//!                         instrumentation::attach_counters
//!                         (slot program i ─▶ COUNTS[i])
//!                                        │ CounterSource
//!                                        ▼
//!                         report::Reporter (poll, print, zero)
//! ```
//!
//! ## Module Structure
//!
//! - [`probe`]: pattern grammar, library resolution, match table
//! - [`discovery`]: tracefs, ELF symbols, USDT notes, ld.so.cache, `/proc/<pid>/maps`
//! - [`instrumentation`]: load and attach the counting programs, read the counters
//! - [`report`]: the reporting loop and its Ctrl-C handling
//! - [`cli`] / [`config`]: command line and the session configuration
//! - [`preflight`]: privilege and kernel checks
//! - [`domain`]: shared types and errors
//!
//! ## Pattern Grammar
//!
//! | pattern | probes |
//! |---------|--------|
//! | `vfs_*` | kernel functions |
//! | `c:malloc` | user functions in libc |
//! | `t:sched:sched_*` | kernel tracepoints |
//! | `u:node:gc*` | USDT probes in node |
//!
//! ## Typical Usage
//!
//! ```bash
//! sudo funccount 'vfs_*'
//! sudo funccount -Ti 5 c:malloc
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod instrumentation;
pub mod preflight;
pub mod probe;
pub mod report;
