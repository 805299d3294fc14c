//! Library resolution for user-space probes

use log::debug;
use std::path::PathBuf;

use crate::discovery::Discovery;
use crate::domain::{FuncCountError, Pid, Result};

/// Resolve a library name to a path, falling back to executables
///
/// `c` resolves through the shared-library search; `bash` is not a library,
/// so the executable search finds `/usr/bin/bash`.
///
/// # Errors
/// Returns [`FuncCountError::NotFound`] if neither search locates the name
pub fn resolve_library<D: Discovery + ?Sized>(
    library: &str,
    discovery: &D,
    pid: Option<Pid>,
) -> Result<PathBuf> {
    let path = discovery
        .find_library(library, pid)
        .or_else(|| discovery.find_executable(library))
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_else(|| FuncCountError::NotFound(library.to_string()))?;

    debug!("Resolved {library} to {}", path.display());
    Ok(path)
}
