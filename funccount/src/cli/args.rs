//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// Default location of the counting object built by `cargo xtask build-ebpf`
pub const DEFAULT_BPF_OBJECT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/../target/bpfel-unknown-none/release/funccount");

#[derive(Parser, Debug)]
#[command(
    name = "funccount",
    version,
    about = "Count functions, tracepoints, and USDT probes",
    after_help = "\
EXAMPLES:
    funccount 'vfs_*'             Count kernel fns starting with \"vfs\"
    funccount -r '^vfs.*'         Same as above, using regular expressions
    funccount -Ti 5 'vfs_*'       Output every 5 seconds, with timestamps
    funccount -p 185 'vfs_*'      Count vfs calls for PID 185 only
    funccount t:sched:sched_fork  Count calls to the sched_fork tracepoint
    funccount -p 185 u:node:gc*   Count all GC USDT probes in node
    funccount c:malloc            Count all malloc() calls in libc"
)]
pub struct Args {
    /// Search expression for events: [p:|t:|u:][LIBRARY:]PATTERN
    #[arg(value_name = "PATTERN")]
    pub pattern: String,

    /// Trace this PID only
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Summary interval, seconds (default: report once on Ctrl-C)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Include timestamp on output
    #[arg(short = 'T', long)]
    pub timestamp: bool,

    /// Use regular expressions. Default is "*" wildcards only.
    #[arg(short, long = "regexp")]
    pub regexp: bool,

    /// Print the attach plan and full error chains
    #[arg(short, long)]
    pub debug: bool,

    /// Compiled eBPF counting object
    #[arg(long, env = "FUNCCOUNT_BPF_OBJECT", default_value = DEFAULT_BPF_OBJECT, hide = true)]
    pub bpf_object: PathBuf,
}
