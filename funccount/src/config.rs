//! Session configuration
//!
//! [`Config`] is built once from the command line and passed down explicitly
//! to the resolver, the attach step, and the reporting loop.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;
use crate::domain::Pid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub pattern: String,
    pub pid: Option<Pid>,
    /// `None` reports once, on Ctrl-C
    pub interval: Option<Duration>,
    pub timestamp: bool,
    pub regex: bool,
    pub debug: bool,
    pub bpf_object: PathBuf,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            pattern: args.pattern,
            pid: args.pid.map(Pid),
            interval: args.interval.map(Duration::from_secs),
            timestamp: args.timestamp,
            regex: args.regexp,
            debug: args.debug,
            bpf_object: args.bpf_object,
        }
    }
}
