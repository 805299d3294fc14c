//! # Instrumentation Point Discovery
//!
//! The resolver never touches tracefs, ELF files or the dynamic linker cache
//! directly; it asks a [`Discovery`] implementation. [`SystemDiscovery`] is
//! the real one, tests substitute their own.
//!
//! Every enumeration is finite and consumed exactly once, in the order the
//! source produces it. Order matters: user-space deduplication keeps the first
//! occurrence.
//!
//! ## Sources
//!
//! | enumeration | source |
//! |-------------|--------|
//! | kernel functions | `<tracefs>/available_filter_functions` minus the kprobe blacklist |
//! | tracepoints | `<tracefs>/events/<category>/<event>/id` |
//! | user functions | `.symtab` and `.dynsym` of the binary |
//! | USDT probes | `.note.stapsdt` notes of the binary (and of the target process's mappings) |
//! | libraries | `/proc/<pid>/maps`, `/etc/ld.so.cache`, standard library directories |
//! | executables | `PATH` |

pub mod elf;
pub mod kernel;
pub mod library;
pub mod memory_maps;

use std::path::{Path, PathBuf};

use crate::domain::{Pid, Result};

pub use kernel::TraceFs;

/// A lazily produced, non-restartable sequence
pub type Enumeration<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// A function symbol found in a user-space binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunction {
    pub name: String,
    pub address: u64,
}

impl UserFunction {
    pub fn new(name: impl Into<String>, address: u64) -> Self {
        Self { name: name.into(), address }
    }
}

/// A USDT probe: every note sharing one `provider:name` in one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdtProbe {
    /// Binary the notes were read from
    pub binary: PathBuf,
    pub provider: String,
    pub name: String,
    /// File offsets of each probe site
    pub locations: Vec<u64>,
    /// Semaphore address, when the probe is guarded by one
    pub semaphore: Option<u64>,
}

/// Enumerates the instrumentation points available on this system
pub trait Discovery {
    /// Locate a shared library by short name (`c` → `/usr/lib/libc.so.6`)
    fn find_library(&self, name: &str, pid: Option<Pid>) -> Option<PathBuf>;

    /// Locate an executable by name (`bash` → `/usr/bin/bash`)
    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    /// Kernel functions that can carry a kprobe
    ///
    /// # Errors
    /// Returns an error if the function list cannot be read
    fn kernel_functions(&self) -> Result<Enumeration<'_, String>>;

    /// Function symbols defined in `binary`
    ///
    /// # Errors
    /// Returns an error if the binary cannot be read or parsed
    fn user_functions(&self, binary: &Path) -> Result<Enumeration<'_, UserFunction>>;

    /// Kernel tracepoints as `category:event`
    ///
    /// # Errors
    /// Returns an error if the tracefs event directory cannot be read
    fn tracepoints(&self) -> Result<Enumeration<'_, String>>;

    /// USDT probes in `binary`, plus those of every binary mapped into `pid`
    ///
    /// # Errors
    /// Returns an error if `binary` cannot be read or parsed
    fn usdt_probes(&self, binary: &Path, pid: Option<Pid>) -> Result<Enumeration<'_, UsdtProbe>>;
}

/// [`Discovery`] backed by tracefs, procfs and the binaries on disk
#[derive(Debug, Clone)]
pub struct SystemDiscovery {
    tracefs: TraceFs,
}

impl SystemDiscovery {
    /// Use the first mounted tracefs
    #[must_use]
    pub fn new() -> Self {
        let tracefs = TraceFs::locate();
        log::debug!("Using tracefs at {}", tracefs.root().display());
        Self { tracefs }
    }
}

impl Default for SystemDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery for SystemDiscovery {
    fn find_library(&self, name: &str, pid: Option<Pid>) -> Option<PathBuf> {
        library::find_library(name, pid)
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        library::find_executable(name)
    }

    fn kernel_functions(&self) -> Result<Enumeration<'_, String>> {
        Ok(Box::new(self.tracefs.kernel_functions()?.into_iter()))
    }

    fn user_functions(&self, binary: &Path) -> Result<Enumeration<'_, UserFunction>> {
        Ok(Box::new(elf::function_symbols(binary)?.into_iter()))
    }

    fn tracepoints(&self) -> Result<Enumeration<'_, String>> {
        Ok(Box::new(self.tracefs.tracepoints()?.into_iter()))
    }

    fn usdt_probes(&self, binary: &Path, pid: Option<Pid>) -> Result<Enumeration<'_, UsdtProbe>> {
        let mut probes = elf::usdt_probes(binary)?;

        if let Some(pid) = pid {
            for mapped in memory_maps::mapped_binaries(pid)? {
                if mapped == binary {
                    continue;
                }
                // Mappings we cannot parse (deleted files, non-ELF data) carry no notes
                match elf::usdt_probes(&mapped) {
                    Ok(found) => probes.extend(found),
                    Err(e) => log::debug!("Skipping {}: {e}", mapped.display()),
                }
            }
        }

        Ok(Box::new(probes.into_iter()))
    }
}
