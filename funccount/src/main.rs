//! # funccount - Main Entry Point
//!
//! Resolves the pattern, attaches one counter per match, and prints the
//! per-function counts every interval (or once on Ctrl-C).

use anyhow::Result;
use clap::Parser;
use log::info;

use funccount::cli::Args;
use funccount::config::Config;
use funccount::discovery::SystemDiscovery;
use funccount::domain::FuncCountError;
use funccount::instrumentation::attach_counters;
use funccount::preflight::run_preflight_checks;
use funccount::probe::{Probe, ProbeSpec};
use funccount::report::{InterruptToken, ReportOptions, Reporter};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    let config = Config::from(Args::parse());
    let debug = config.debug;
    std::process::exit(match run(config) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            if debug {
                eprintln!("{e:?}");
            }
            println!("{e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let denied = err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<FuncCountError>() {
            return e.is_permission_denied();
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            return e.kind() == std::io::ErrorKind::PermissionDenied;
        }
        cause.to_string().to_lowercase().contains("permission denied")
    });
    if denied {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run(config: Config) -> Result<()> {
    let spec = ProbeSpec::parse(&config.pattern, config.regex)?;
    run_preflight_checks(&config)?;

    let discovery = SystemDiscovery::new();
    let probe = Probe::resolve(spec, &discovery, config.pid)?;
    if let Some(library) = probe.library() {
        info!("Resolved {} to {}", probe.spec.library, library.display());
    }

    let counters = attach_counters(&probe, config.pid, &config.bpf_object, config.debug)?;
    println!(
        "Tracing {} functions for \"{}\"... Hit Ctrl-C to end.",
        probe.matched(),
        config.pattern
    );

    let interrupt = InterruptToken::new();
    let listener = interrupt.listen_for_ctrl_c();

    let mut reporter =
        Reporter::new(&probe.table, counters, std::io::stdout(), ReportOptions::from(&config));
    let outcome = reporter.run(&interrupt).await;
    listener.abort();
    reporter.into_source().detach();

    outcome?;
    Ok(())
}
