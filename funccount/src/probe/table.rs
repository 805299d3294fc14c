//! Match discovery and location assignment
//!
//! Turns a [`ProbeSpec`] into a [`MatchTable`]: the ordered list of probes the
//! pattern selected, each identified by a dense [`Location`].
//!
//! ## User-space deduplication
//!
//! One address can carry several symbol names (aliases such as `malloc` and
//! `__libc_malloc`) and one name can appear at several addresses (`.symtab`
//! and `.dynsym`, local copies). Only one uprobe may sit on an address, and a
//! name must not be counted twice, so a user function is skipped when either
//! its address or its name was already accepted. First occurrence wins.

use funccount_common::MAX_LOCATIONS;
use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::ProbeSpec;
use crate::discovery::{Discovery, UserFunction};
use crate::domain::{FuncCountError, Location, Pid, ProbeKind, Result};

/// One resolved instrumentation point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Function name, `category:event`, or USDT probe name
    pub name: String,
    /// Binary holding the probe (user functions and USDT only)
    pub binary: Option<PathBuf>,
    /// Symbol address (user functions) or file offsets (USDT sites)
    pub addresses: Vec<u64>,
    /// USDT semaphore, when the probe is guarded by one
    pub semaphore: Option<u64>,
}

impl Match {
    /// A kernel function or tracepoint
    pub fn kernel(name: impl Into<String>) -> Self {
        Self { name: name.into(), binary: None, addresses: Vec::new(), semaphore: None }
    }
}

/// Location → match, contiguous from 0 and never empty
///
/// There are no mutating accessors: the table is fixed before attaching.
#[derive(Debug, Clone)]
pub struct MatchTable {
    entries: Vec<Match>,
}

impl MatchTable {
    /// Number the matches in order
    ///
    /// # Errors
    /// [`FuncCountError::NoMatch`] when `matches` is empty,
    /// [`FuncCountError::TooManyMatches`] when there are more matches than
    /// counting slots
    pub fn new(matches: Vec<Match>, pattern: &str) -> Result<Self> {
        if matches.is_empty() {
            return Err(FuncCountError::NoMatch(pattern.to_string()));
        }
        if matches.len() > MAX_LOCATIONS as usize {
            return Err(FuncCountError::TooManyMatches {
                pattern: pattern.to_string(),
                matched: matches.len(),
                max: MAX_LOCATIONS,
            });
        }
        Ok(Self { entries: matches })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, location: Location) -> Option<&Match> {
        self.entries.get(location.0 as usize)
    }

    /// Display name for a location
    #[must_use]
    pub fn name(&self, location: Location) -> Option<&str> {
        self.get(location).map(|m| m.name.as_str())
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (Location, &Match)> {
        // Bounded by MAX_LOCATIONS, so the index fits in u32
        self.entries.iter().enumerate().map(|(i, m)| (Location(i as u32), m))
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.iter().map(|(location, _)| location)
    }
}

/// Keep the first-seen name per address, and each name at most once
///
/// Every address is claimed by the first entry that mentions it, even when
/// that entry is dropped for a repeated name.
pub fn dedup_user_functions(
    functions: impl IntoIterator<Item = UserFunction>,
) -> impl Iterator<Item = UserFunction> {
    let mut addresses = HashSet::new();
    let mut names = HashSet::new();
    functions.into_iter().filter(move |f| {
        let new_address = addresses.insert(f.address);
        if !new_address || names.contains(&f.name) {
            return false;
        }
        names.insert(f.name.clone());
        true
    })
}

/// Enumerate the instrumentation points `spec` selects, in discovery order
///
/// `library` is the resolved path for user functions and USDT probes.
///
/// # Errors
/// Returns an error if the collaborator's enumeration cannot be read
pub fn discover_matches<D: Discovery + ?Sized>(
    spec: &ProbeSpec,
    library: Option<&Path>,
    discovery: &D,
    pid: Option<Pid>,
) -> Result<Vec<Match>> {
    let library_path = || library.ok_or_else(|| FuncCountError::NotFound(spec.library.clone()));

    let matches = match spec.kind {
        ProbeKind::Tracepoint => {
            discovery.tracepoints()?.filter(|tp| spec.matches(tp)).map(Match::kernel).collect()
        }
        ProbeKind::Function if spec.is_kernel_probe() => discovery
            .kernel_functions()?
            .filter(|f| spec.matches(f))
            .map(Match::kernel)
            .collect(),
        ProbeKind::Function => {
            let library = library_path()?;
            let candidates = discovery.user_functions(library)?.filter(|f| spec.matches(&f.name));
            dedup_user_functions(candidates)
                .map(|f| Match {
                    name: f.name,
                    binary: Some(library.to_path_buf()),
                    addresses: vec![f.address],
                    semaphore: None,
                })
                .collect()
        }
        ProbeKind::Usdt => {
            let library = library_path()?;
            discovery
                .usdt_probes(library, pid)?
                // Without a process, only the library's own probes are countable
                .filter(|probe| pid.is_some() || probe.binary == library)
                .filter(|probe| spec.matches(&probe.name))
                .map(|probe| Match {
                    name: probe.name,
                    binary: Some(probe.binary),
                    addresses: probe.locations,
                    semaphore: probe.semaphore,
                })
                .collect()
        }
    };

    Ok(matches)
}

/// Discover matches and assign locations `0..N`
///
/// # Errors
/// [`FuncCountError::NoMatch`] when nothing matched, plus any discovery error
pub fn build_match_table<D: Discovery + ?Sized>(
    spec: &ProbeSpec,
    library: Option<&Path>,
    discovery: &D,
    pid: Option<Pid>,
) -> Result<MatchTable> {
    let matches = discover_matches(spec, library, discovery, pid)?;
    debug!("Pattern {} matched {} probes", spec.pattern(), matches.len());
    MatchTable::new(matches, spec.pattern())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let functions = vec![
            UserFunction::new("f1", 0xa1),
            UserFunction::new("f2", 0xa1),
            UserFunction::new("f1", 0xa2),
            UserFunction::new("f3", 0xa2),
        ];
        let accepted: Vec<UserFunction> = dedup_user_functions(functions).collect();
        assert_eq!(accepted, vec![UserFunction::new("f1", 0xa1)]);
    }

    #[test]
    fn test_dedup_keeps_distinct() {
        let functions = vec![
            UserFunction::new("malloc", 0x10),
            UserFunction::new("free", 0x20),
            UserFunction::new("__libc_malloc", 0x10),
            UserFunction::new("calloc", 0x30),
        ];
        let names: Vec<String> = dedup_user_functions(functions).map(|f| f.name).collect();
        assert_eq!(names, vec!["malloc", "free", "calloc"]);
    }

    #[test]
    fn test_dropped_alias_still_claims_its_address() {
        // `f1` is dropped at 0xb0, but 0xb0 now belongs to it
        let functions = vec![
            UserFunction::new("f1", 0xa0),
            UserFunction::new("f1", 0xb0),
            UserFunction::new("f2", 0xb0),
            UserFunction::new("f3", 0xc0),
        ];
        let names: Vec<String> = dedup_user_functions(functions).map(|f| f.name).collect();
        assert_eq!(names, vec!["f1", "f3"]);
    }

    #[test]
    fn test_table_rejects_empty() {
        let err = MatchTable::new(Vec::new(), "^nothing$").unwrap_err();
        assert!(matches!(err, FuncCountError::NoMatch(ref p) if p == "^nothing$"));
    }

    #[test]
    fn test_table_rejects_more_than_slots() {
        let matches = (0..=MAX_LOCATIONS).map(|i| Match::kernel(format!("f{i}"))).collect();
        let err = MatchTable::new(matches, "^f.*$").unwrap_err();
        assert!(matches!(err, FuncCountError::TooManyMatches { matched, .. } if matched == MAX_LOCATIONS as usize + 1));
    }

    #[test]
    fn test_table_locations_are_dense() {
        let table = MatchTable::new(
            vec![Match::kernel("vfs_read"), Match::kernel("vfs_write"), Match::kernel("vfs_open")],
            "^vfs_.*$",
        )
        .unwrap();
        let locations: Vec<Location> = table.locations().collect();
        assert_eq!(locations, vec![Location(0), Location(1), Location(2)]);
        assert_eq!(table.name(Location(1)), Some("vfs_write"));
        assert_eq!(table.name(Location(3)), None);
    }
}
