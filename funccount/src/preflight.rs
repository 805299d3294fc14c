//! Pre-flight checks for funccount
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::domain::Pid;

/// Tracepoint programs need Linux 4.7
const MIN_KERNEL_VERSION: (u32, u32) = (4, 7);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns an error describing the first unmet requirement
pub fn run_preflight_checks(config: &Config) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_bpf_object(&config.bpf_object)?;
    if let Some(pid) = config.pid {
        check_process_exists(pid)?;
    }
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: funccount requires root privileges to load eBPF programs.\n\n\
         Run with: sudo funccount ..."
    );
}

/// Parse `major.minor` out of a release string like `6.1.0-arch1-1`
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 5.15.0-generic ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             funccount requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// Check that the compiled counting object is present
fn check_bpf_object(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!(
            "eBPF object not found: {}\n\n\
             Build it with: cargo xtask build-ebpf\n\
             or point FUNCCOUNT_BPF_OBJECT at an existing build.",
            path.display()
        );
    }
    Ok(())
}

/// Check if the target process exists
///
/// # Errors
/// Returns an error if `/proc/<pid>` does not exist
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.0);
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_check() {
        // Don't assert success since test might run on old kernel
        let _ = check_kernel_version();
    }

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(parse_kernel_release("6.1.0-arch1-1"), Some((6, 1)));
        assert_eq!(parse_kernel_release("4.19rc2"), Some((4, 19)));
        assert_eq!(parse_kernel_release("unknown"), None);
        assert!(parse_kernel_release("4.4.0").unwrap() < MIN_KERNEL_VERSION);
    }

    #[test]
    fn test_bpf_object_not_found() {
        let err = check_bpf_object(Path::new("/nonexistent/funccount")).unwrap_err();
        assert!(err.to_string().contains("eBPF object not found"));
    }

    #[test]
    fn test_bpf_object_present() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(check_bpf_object(file.path()).is_ok());
    }

    #[test]
    fn test_process_not_found() {
        let result = check_process_exists(Pid(999_999_999));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"));
    }
}
