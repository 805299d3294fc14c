//! Structured error types for funccount
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every variant is fatal at the point it occurs; nothing is retried.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuncCountError {
    /// Malformed probe spec: bad type letter, too many separators, bad regex
    #[error("{0}")]
    InvalidSpec(String),

    #[error("unable to find library {0}")]
    NotFound(String),

    #[error("No functions matched by pattern {0}")]
    NoMatch(String),

    #[error("Pattern {pattern} matched {matched} probes, but at most {max} can be counted")]
    TooManyMatches { pattern: String, matched: usize, max: u32 },

    #[error("Failed to attach {probe} to {target}: {error}")]
    AttachFailed { probe: String, target: String, error: String },

    #[error("Failed to read {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ebpf(#[from] aya::EbpfError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),
}

impl FuncCountError {
    pub(crate) fn discovery(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FuncCountError::Discovery { path: path.into(), source }
    }

    /// Whether the failure comes from missing privileges
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            FuncCountError::Discovery { source, .. } | FuncCountError::Io(source) => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            FuncCountError::AttachFailed { error, .. } => {
                error.contains("Operation not permitted") || error.contains("Permission denied")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FuncCountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_display() {
        let err = FuncCountError::NoMatch("^vfs_.*$".to_string());
        assert_eq!(err.to_string(), "No functions matched by pattern ^vfs_.*$");
    }

    #[test]
    fn test_attach_error() {
        let err = FuncCountError::AttachFailed {
            probe: "count_uprobe_0".to_string(),
            target: "/usr/lib/libc.so.6:malloc".to_string(),
            error: "symbol not found".to_string(),
        };
        assert!(err.to_string().contains("count_uprobe_0"));
        assert!(err.to_string().contains("/usr/lib/libc.so.6:malloc"));
    }

    #[test]
    fn test_discovery_error_names_path() {
        let err = FuncCountError::discovery(
            "/sys/kernel/tracing/available_filter_functions",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("available_filter_functions"));
        assert!(err.is_permission_denied());
        assert!(!FuncCountError::NotFound("c".to_string()).is_permission_denied());
    }
}
