//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep a location index from being mixed up with a
//! process ID or a raw counter value.

use std::fmt;

/// Process ID (TGID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<Pid> for i32 {
    #[allow(clippy::cast_possible_wrap)]
    fn from(pid: Pid) -> Self {
        pid.0 as i32
    }
}

/// Dense index assigned to one resolved probe match
///
/// Locations run `0..N` in discovery order and double as the index into the
/// kernel-side `COUNTS` array and the counting slot program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(pub u32);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of instrumentation point a pattern targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Kernel function (no library) or user-space function (with library)
    Function,
    /// Kernel tracepoint, `category:event`
    Tracepoint,
    /// Statically-defined user-space marker
    Usdt,
}

impl ProbeKind {
    /// The type letter used in probe specs (`p`, `t`, `u`)
    #[must_use]
    pub fn letter(self) -> &'static str {
        match self {
            ProbeKind::Function => "p",
            ProbeKind::Tracepoint => "t",
            ProbeKind::Usdt => "u",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}
