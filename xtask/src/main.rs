use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

const EBPF_PACKAGE: &str = "funccount-ebpf";

/// Binary name of the kernel-side crate, also the object's file name
const EBPF_OBJECT: &str = "funccount";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the kernel-side counting programs
    BuildEbpf(BuildOptions),
    /// Build the counting programs, then run funccount against them
    Run {
        #[command(flatten)]
        build: BuildOptions,
        /// Arguments passed through to funccount
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Parser)]
struct BuildOptions {
    #[arg(long, default_value = "bpfel-unknown-none")]
    target: String,
    /// Toolchain with `build-std` support
    #[arg(long, default_value = "nightly")]
    toolchain: String,
}

impl BuildOptions {
    /// Where cargo leaves the object for this target
    fn object_path(&self) -> PathBuf {
        workspace_root().join("target").join(&self.target).join("release").join(EBPF_OBJECT)
    }

    fn build_command(&self) -> Command {
        // Debug builds pull in formatting code (LowerHex) the BPF linker rejects,
        // so the object is always built with the release profile.
        let mut cmd = Command::new("cargo");
        cmd.current_dir(workspace_root())
            .arg(format!("+{}", self.toolchain))
            .args(["build", "--package", EBPF_PACKAGE, "--target"])
            .arg(&self.target)
            .args(["-Z", "build-std=core", "--release"]);
        cmd
    }
}

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf(build) => {
            build_ebpf(&build)?;
        }
        Cmd::Run { build, args } => {
            let object = build_ebpf(&build)?;
            run_funccount(&object, &args)?;
        }
    }

    Ok(())
}

fn build_ebpf(options: &BuildOptions) -> Result<PathBuf> {
    let status = options
        .build_command()
        .status()
        .with_context(|| format!("Failed to start cargo +{}", options.toolchain))?;
    if !status.success() {
        bail!("Building {EBPF_PACKAGE} for {} failed ({status})", options.target);
    }

    let object = options.object_path();
    let size = object
        .metadata()
        .with_context(|| format!("Build succeeded but {} is missing", object.display()))?
        .len();

    println!("✓ eBPF counters built successfully");
    println!("  Target: {}", options.target);
    println!("  Object: {} ({size} bytes)", object.display());

    Ok(object)
}

fn run_funccount(object: &std::path::Path, args: &[String]) -> Result<()> {
    let status = Command::new("cargo")
        .current_dir(workspace_root())
        .args(["run", "--release", "--package", "funccount", "--", "--bpf-object"])
        .arg(object)
        .args(args)
        .status()
        .context("Failed to start funccount")?;
    if !status.success() {
        bail!("funccount exited with {status}");
    }
    Ok(())
}
