//! # Shared Constants (eBPF ↔ Userspace)
//!
//! Names and sizes that the kernel-side counting programs and the userspace
//! loader must agree on. Nothing here allocates, so the crate builds for both
//! `bpfel-unknown-none` and the host.
//!
//! ## Counting slots
//!
//! Every resolved probe is assigned a dense location `0..N`. Location `i` is
//! counted by the program named `<prefix><i>` (one prefix per attach type),
//! which increments `COUNTS[i]`. The object ships [`MAX_LOCATIONS`] slots per
//! attach type.

#![no_std]

/// Number of counting slots (and `COUNTS` entries) per attach type
pub const MAX_LOCATIONS: u32 = 256;

/// Per-CPU array: location → number of calls
pub const COUNTS_MAP: &str = "COUNTS";

/// Config key → config value
pub const CONFIG_MAP: &str = "CONFIG";

/// `CONFIG` key holding the tgid to count (0 counts every process)
pub const CONFIG_TARGET_PID: u32 = 0;

/// Kernel function slots: `count_kprobe_0`, `count_kprobe_1`, ...
pub const KPROBE_PROGRAM_PREFIX: &str = "count_kprobe_";

/// User function and USDT slots
pub const UPROBE_PROGRAM_PREFIX: &str = "count_uprobe_";

/// Kernel tracepoint slots
pub const TRACEPOINT_PROGRAM_PREFIX: &str = "count_tracepoint_";
