//! # Pattern Resolution
//!
//! From the string the user typed to a numbered list of probes:
//!
//! 1. [`ProbeSpec::parse`] - grammar and glob/regex translation
//! 2. [`resolve_library`] - library or executable path for user-space probes
//! 3. [`build_match_table`] - enumerate, filter, dedup, assign locations
//!
//! [`Probe`] bundles the three results for the rest of the session.

pub mod library;
pub mod spec;
pub mod table;

use std::path::{Path, PathBuf};

use crate::discovery::Discovery;
use crate::domain::{Pid, Result};

pub use library::resolve_library;
pub use spec::ProbeSpec;
pub use table::{build_match_table, dedup_user_functions, discover_matches, Match, MatchTable};

/// A resolved probe session: the spec, its library, and the matches
#[derive(Debug, Clone)]
pub struct Probe {
    pub spec: ProbeSpec,
    /// Resolved path for user functions and USDT probes
    pub library: Option<PathBuf>,
    pub table: MatchTable,
}

impl Probe {
    /// Resolve the library (when needed) and build the match table
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown library, `NoMatch` when the pattern
    /// selects nothing, or a discovery error
    pub fn resolve<D: Discovery + ?Sized>(
        spec: ProbeSpec,
        discovery: &D,
        pid: Option<Pid>,
    ) -> Result<Self> {
        let library = if spec.needs_library() {
            Some(resolve_library(&spec.library, discovery, pid)?)
        } else {
            None
        };
        let table = build_match_table(&spec, library.as_deref(), discovery, pid)?;
        Ok(Self { spec, library, table })
    }

    #[must_use]
    pub fn library(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    /// Number of matched probes
    #[must_use]
    pub fn matched(&self) -> usize {
        self.table.len()
    }
}
