//! Process memory map parsing
//!
//! Reads `/proc/<pid>/maps` to find the files a process has mapped. Used to
//! resolve a library name against what a target process actually loaded, and
//! to walk every mapped binary when enumerating USDT probes for a process.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::domain::{FuncCountError, Pid, Result};

/// Pseudo-paths that appear in the pathname column but are not files
const ANONYMOUS_MAPPINGS: [&str; 6] = ["//anon", "/dev/zero", "/anon_hugepage", "[stack", "/SYSV", "[heap]"];

/// Distinct file-backed mappings of `pid`, in address order
///
/// # Errors
/// Returns an error if `/proc/<pid>/maps` cannot be read
pub fn mapped_binaries(pid: Pid) -> Result<Vec<PathBuf>> {
    let maps = read_maps(pid)?;
    let mut seen = HashSet::new();
    Ok(file_backed_paths(&maps)
        .filter(|path| seen.insert(path.to_string()))
        .map(PathBuf::from)
        .collect())
}

/// Find the mapping of `lib<name>` in a running process
///
/// Matches `/lib<name>.` or `/lib<name>-` in a path that also contains `.so`,
/// so `c` finds `/usr/lib/x86_64-linux-gnu/libc.so.6` and `libc-2.31.so`.
#[must_use]
pub fn find_mapped_library(pid: Pid, name: &str) -> Option<PathBuf> {
    let maps = read_maps(pid).ok()?;
    find_library_in_maps(&maps, name)
}

fn read_maps(pid: Pid) -> Result<String> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    fs::read_to_string(&maps_path).map_err(|e| FuncCountError::discovery(&maps_path, e))
}

/// Pathname column of every file-backed line
///
/// Line format: "start-end perms offset dev inode pathname"
fn file_backed_paths(maps: &str) -> impl Iterator<Item = &str> {
    maps.lines().filter_map(|line| {
        let path = line.splitn(6, char::is_whitespace).nth(5)?.trim();
        let file_backed =
            !path.is_empty() && !ANONYMOUS_MAPPINGS.iter().any(|anon| path.starts_with(anon));
        file_backed.then_some(path)
    })
}

fn find_library_in_maps(maps: &str, name: &str) -> Option<PathBuf> {
    let dotted = format!("/lib{name}.");
    let dashed = format!("/lib{name}-");
    file_backed_paths(maps)
        .find(|path| path.contains(".so") && (path.contains(&dotted) || path.contains(&dashed)))
        .map(PathBuf::from)
}
