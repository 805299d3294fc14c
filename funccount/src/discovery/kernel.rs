//! Kernel-side enumerations read from tracefs
//!
//! - `available_filter_functions`: one function per line, optionally followed
//!   by `[module]`
//! - `events/<category>/<event>/id`: one directory per tracepoint
//! - the kprobe blacklist (debugfs): `0xstart-0xend<TAB>name`

use log::debug;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{FuncCountError, Result};

/// Candidate tracefs mount points, in preference order
const TRACEFS_ROOTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

const KPROBE_BLACKLIST: &str = "/sys/kernel/debug/kprobes/blacklist";

/// Symbols the kernel refuses to kprobe even though ftrace lists them
const UNPROBEABLE_PREFIXES: [&str; 4] = ["_kbl_addr_", "__perf", "perf_", "__SCT__"];

/// A tracefs mount plus the kprobe blacklist that goes with it
#[derive(Debug, Clone)]
pub struct TraceFs {
    root: PathBuf,
    blacklist: PathBuf,
}

impl TraceFs {
    /// Pick the first candidate mount that exposes `events/`
    #[must_use]
    pub fn locate() -> Self {
        let root = TRACEFS_ROOTS
            .iter()
            .map(PathBuf::from)
            .find(|root| root.join("events").is_dir())
            .unwrap_or_else(|| PathBuf::from(TRACEFS_ROOTS[0]));
        Self::at(root)
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), blacklist: PathBuf::from(KPROBE_BLACKLIST) }
    }

    #[cfg(test)]
    #[must_use]
    fn with_blacklist(mut self, blacklist: impl Into<PathBuf>) -> Self {
        self.blacklist = blacklist.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Functions that can carry a kprobe, in tracefs order, without duplicates
    ///
    /// # Errors
    /// Returns an error if `available_filter_functions` cannot be read
    pub fn kernel_functions(&self) -> Result<Vec<String>> {
        let path = self.root.join("available_filter_functions");
        let content =
            fs::read_to_string(&path).map_err(|e| FuncCountError::discovery(&path, e))?;

        // The blacklist lives in debugfs, which may not be mounted
        let blacklist = match fs::read_to_string(&self.blacklist) {
            Ok(content) => parse_blacklist(&content),
            Err(e) => {
                debug!("No kprobe blacklist at {}: {e}", self.blacklist.display());
                HashSet::new()
            }
        };

        Ok(parse_filter_functions(&content, &blacklist))
    }

    /// Tracepoints as `category:event`, sorted
    ///
    /// # Errors
    /// Returns an error if the `events/` directory cannot be listed
    pub fn tracepoints(&self) -> Result<Vec<String>> {
        let events = self.root.join("events");
        let mut tracepoints = Vec::new();

        for category in sorted_subdirs(&events)? {
            let category_dir = events.join(&category);
            // A category may vanish (module unload) while we walk it
            let Ok(names) = sorted_subdirs(&category_dir) else {
                continue;
            };
            for event in names {
                if category_dir.join(&event).join("id").is_file() {
                    tracepoints.push(format!("{category}:{event}"));
                }
            }
        }

        Ok(tracepoints)
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| FuncCountError::discovery(dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            if !entry.file_type().ok()?.is_dir() {
                return None;
            }
            Some(entry.file_name().to_string_lossy().into_owned())
        })
        .collect();
    names.sort();
    Ok(names)
}

fn parse_blacklist(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

fn parse_filter_functions(content: &str, blacklist: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| is_probeable(name) && !blacklist.contains(*name))
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_probeable(name: &str) -> bool {
    !UNPROBEABLE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) && !is_cold_clone(name)
}

/// gcc's outlined cold paths: `foo.cold` or `foo.cold.<n>`
fn is_cold_clone(name: &str) -> bool {
    let Some((_, suffix)) = name.rsplit_once(".cold") else {
        return false;
    };
    suffix.is_empty()
        || suffix
            .strip_prefix('.')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
