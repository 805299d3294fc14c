//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled counting object and attaches one slot program per
//! matched probe.
//!
//! ## Functions
//!
//! - [`plan_attach()`] - Decide which slot program goes where (no kernel access)
//! - [`load_ebpf_program()`] - Load the counting object from disk
//! - [`attach_counters()`] - Load, configure, attach, and hand back a [`CounterHandle`]
//!
//! ## Attachment Points
//!
//! | probe | program | attach |
//! |-------|---------|--------|
//! | kernel function | `count_kprobe_<i>` | kprobe on the function |
//! | user function | `count_uprobe_<i>` | uprobe on the symbol in the library |
//! | USDT | `count_uprobe_<i>` | uprobe at every note site (file offset) |
//! | tracepoint | `count_tracepoint_<i>` | `category/event` |

use anyhow::{Context, Result};
use aya::{
    maps::{HashMap, PerCpuArray},
    programs::{KProbe, TracePoint, UProbe},
    Ebpf,
};
use aya_log::EbpfLogger;
use funccount_common::{
    CONFIG_MAP, CONFIG_TARGET_PID, COUNTS_MAP, KPROBE_PROGRAM_PREFIX, TRACEPOINT_PROGRAM_PREFIX,
    UPROBE_PROGRAM_PREFIX,
};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::counters::{CounterHandle, CounterSource};
use crate::domain::{FuncCountError, Location, Pid, ProbeKind};
use crate::probe::Probe;

/// Where one slot program gets attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachPoint {
    Kprobe { function: String },
    Uprobe { binary: PathBuf, symbol: String },
    UsdtSite { binary: PathBuf, offset: u64 },
    Tracepoint { category: String, name: String },
}

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachPoint::Kprobe { function } => write!(f, "kprobe:{function}"),
            AttachPoint::Uprobe { binary, symbol } => write!(f, "uprobe:{}:{symbol}", binary.display()),
            AttachPoint::UsdtSite { binary, offset } => {
                write!(f, "usdt:{}+0x{offset:x}", binary.display())
            }
            AttachPoint::Tracepoint { category, name } => write!(f, "tracepoint:{category}:{name}"),
        }
    }
}

/// One slot program attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttach {
    pub location: Location,
    pub program: String,
    pub point: AttachPoint,
}

/// Map every location of the probe to its slot program and attach point
///
/// USDT probes produce one entry per probe site, all sharing a slot.
///
/// # Errors
/// Returns [`FuncCountError::AttachFailed`] for a match that lacks attach information
pub fn plan_attach(probe: &Probe) -> std::result::Result<Vec<PlannedAttach>, FuncCountError> {
    let mut plan = Vec::new();
    for (location, matched) in probe.table.iter() {
        let missing = |what: &str| FuncCountError::AttachFailed {
            probe: matched.name.clone(),
            target: probe.spec.library.clone(),
            error: format!("no {what} resolved"),
        };

        match probe.spec.kind {
            ProbeKind::Tracepoint => {
                let (category, name) =
                    matched.name.split_once(':').ok_or_else(|| missing("tracepoint category"))?;
                plan.push(PlannedAttach {
                    location,
                    program: format!("{TRACEPOINT_PROGRAM_PREFIX}{}", location.0),
                    point: AttachPoint::Tracepoint {
                        category: category.to_string(),
                        name: name.to_string(),
                    },
                });
            }
            ProbeKind::Function if probe.spec.is_kernel_probe() => plan.push(PlannedAttach {
                location,
                program: format!("{KPROBE_PROGRAM_PREFIX}{}", location.0),
                point: AttachPoint::Kprobe { function: matched.name.clone() },
            }),
            ProbeKind::Function => {
                let binary = matched.binary.clone().ok_or_else(|| missing("binary"))?;
                plan.push(PlannedAttach {
                    location,
                    program: format!("{UPROBE_PROGRAM_PREFIX}{}", location.0),
                    point: AttachPoint::Uprobe { binary, symbol: matched.name.clone() },
                });
            }
            ProbeKind::Usdt => {
                let binary = matched.binary.as_ref().ok_or_else(|| missing("binary"))?;
                if matched.addresses.is_empty() {
                    return Err(missing("probe site"));
                }
                for &offset in &matched.addresses {
                    plan.push(PlannedAttach {
                        location,
                        program: format!("{UPROBE_PROGRAM_PREFIX}{}", location.0),
                        point: AttachPoint::UsdtSite { binary: binary.clone(), offset },
                    });
                }
            }
        }
    }

    Ok(plan)
}

/// Load the counting object
///
/// Always uses the release build: debug builds pull in formatting code that
/// the BPF linker rejects.
///
/// # Errors
/// Returns an error if the object file cannot be read or loaded
pub fn load_ebpf_program(object: &Path) -> Result<Ebpf> {
    let bpf = Ebpf::load_file(object).with_context(|| {
        format!(
            "Failed to load eBPF counters from {}\n\n\
             Build them with: cargo xtask build-ebpf",
            object.display()
        )
    })?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        // Programs that never log leave no log map behind
        debug!("eBPF logger not initialized: {e}");
    }
}

/// Restrict counting to one process (0 counts everything)
///
/// # Errors
/// Returns an error if the `CONFIG` map is missing or cannot be written
pub fn set_target_pid(bpf: &mut Ebpf, pid: Option<Pid>) -> Result<()> {
    let mut config: HashMap<_, u32, u64> =
        HashMap::try_from(bpf.map_mut(CONFIG_MAP).context("CONFIG map not found")?)?;
    let target = pid.map_or(0, |pid| u64::from(pid.0));
    config.insert(CONFIG_TARGET_PID, target, 0)?;
    if let Some(pid) = pid {
        info!("✓ Counting only {pid}");
    }
    Ok(())
}

fn attach_failed(planned: &PlannedAttach, error: impl fmt::Display) -> FuncCountError {
    FuncCountError::AttachFailed {
        probe: planned.program.clone(),
        target: planned.point.to_string(),
        error: error.to_string(),
    }
}

fn attach_one(
    bpf: &mut Ebpf,
    planned: &PlannedAttach,
    pid: Option<Pid>,
    loaded: &mut HashSet<String>,
) -> Result<()> {
    let program = bpf
        .program_mut(&planned.program)
        .with_context(|| format!("{} program not found", planned.program))?;
    let first_use = loaded.insert(planned.program.clone());

    match &planned.point {
        AttachPoint::Kprobe { function } => {
            let program: &mut KProbe = program.try_into()?;
            if first_use {
                program.load().map_err(|e| attach_failed(planned, e))?;
            }
            program.attach(function, 0).map_err(|e| attach_failed(planned, e))?;
        }
        AttachPoint::Uprobe { binary, symbol } => {
            let program: &mut UProbe = program.try_into()?;
            if first_use {
                program.load().map_err(|e| attach_failed(planned, e))?;
            }
            program
                .attach(Some(symbol.as_str()), 0, binary, pid.map(i32::from))
                .map_err(|e| attach_failed(planned, e))?;
        }
        AttachPoint::UsdtSite { binary, offset } => {
            let program: &mut UProbe = program.try_into()?;
            if first_use {
                program.load().map_err(|e| attach_failed(planned, e))?;
            }
            program
                .attach(None, *offset, binary, pid.map(i32::from))
                .map_err(|e| attach_failed(planned, e))?;
        }
        AttachPoint::Tracepoint { category, name } => {
            let program: &mut TracePoint = program.try_into()?;
            if first_use {
                program.load().map_err(|e| attach_failed(planned, e))?;
            }
            program.attach(category, name).map_err(|e| attach_failed(planned, e))?;
        }
    }

    debug!("✓ Attached {} to {}", planned.program, planned.point);
    Ok(())
}

/// Load the counting object and attach one slot per matched probe
///
/// With `debug`, the attach plan is printed before anything is loaded.
///
/// # Errors
/// Returns an error if the object cannot be loaded or any probe fails to attach
pub fn attach_counters(
    probe: &Probe,
    pid: Option<Pid>,
    object: &Path,
    debug: bool,
) -> Result<CounterHandle> {
    let plan = plan_attach(probe)?;
    if debug {
        for planned in &plan {
            println!("{:<24} {}", planned.program, planned.point);
        }
    }

    for (location, matched) in probe.table.iter() {
        if matched.semaphore.is_some() {
            warn!(
                "USDT probe {} ({location}) is guarded by a semaphore; it only fires while enabled",
                matched.name
            );
        }
    }

    let mut bpf = load_ebpf_program(object)?;
    init_ebpf_logger(&mut bpf);
    set_target_pid(&mut bpf, pid)?;

    let mut loaded = HashSet::new();
    for planned in &plan {
        attach_one(&mut bpf, planned, pid, &mut loaded)?;
    }
    info!("✓ Attached {} probe sites for {} locations", plan.len(), probe.table.len());

    let counts: PerCpuArray<_, u64> =
        PerCpuArray::try_from(bpf.take_map(COUNTS_MAP).context("COUNTS map not found")?)?;
    // Per-CPU values are sized by possible CPUs, not online ones
    let nr_cpus = aya::util::nr_cpus()
        .map_err(|e| anyhow::anyhow!("Failed to count possible CPUs: {e:?}"))?;

    let mut handle = CounterHandle::new(bpf, counts, probe.table.locations().collect(), nr_cpus);
    // Start from zero even if the map was pinned or reused
    handle.reset()?;
    Ok(handle)
}
