//! Pattern resolution against a fake discovery source

use std::cell::Cell;
use std::path::{Path, PathBuf};

use funccount::discovery::{Discovery, Enumeration, UserFunction, UsdtProbe};
use funccount::domain::{FuncCountError, Location, Pid, ProbeKind, Result};
use funccount::probe::{Probe, ProbeSpec};

const LIBC: &str = "/usr/lib/libc.so.6";
const NODE: &str = "/usr/bin/node";

#[derive(Default)]
struct FakeDiscovery {
    kernel: Vec<&'static str>,
    tracepoints: Vec<&'static str>,
    functions: Vec<(&'static str, u64)>,
    usdt: Vec<UsdtProbe>,
    enumerations: Cell<usize>,
}

impl FakeDiscovery {
    fn counted<'a, T: 'a>(&'a self, items: Vec<T>) -> Enumeration<'a, T> {
        self.enumerations.set(self.enumerations.get() + 1);
        Box::new(items.into_iter())
    }
}

impl Discovery for FakeDiscovery {
    fn find_library(&self, name: &str, _pid: Option<Pid>) -> Option<PathBuf> {
        (name == "c").then(|| PathBuf::from(LIBC))
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        (name == "node").then(|| PathBuf::from(NODE))
    }

    fn kernel_functions(&self) -> Result<Enumeration<'_, String>> {
        Ok(self.counted(self.kernel.iter().map(ToString::to_string).collect()))
    }

    fn user_functions(&self, binary: &Path) -> Result<Enumeration<'_, UserFunction>> {
        assert_eq!(binary, Path::new(LIBC));
        let functions = self.functions.iter().map(|&(n, a)| UserFunction::new(n, a)).collect();
        Ok(self.counted(functions))
    }

    fn tracepoints(&self) -> Result<Enumeration<'_, String>> {
        Ok(self.counted(self.tracepoints.iter().map(ToString::to_string).collect()))
    }

    fn usdt_probes(&self, _binary: &Path, _pid: Option<Pid>) -> Result<Enumeration<'_, UsdtProbe>> {
        Ok(self.counted(self.usdt.clone()))
    }
}

fn usdt(binary: &str, name: &str, locations: Vec<u64>) -> UsdtProbe {
    UsdtProbe {
        binary: PathBuf::from(binary),
        provider: "node".to_string(),
        name: name.to_string(),
        locations,
        semaphore: None,
    }
}

fn resolve(pattern: &str, discovery: &FakeDiscovery, pid: Option<Pid>) -> Result<Probe> {
    Probe::resolve(ProbeSpec::parse(pattern, false)?, discovery, pid)
}

#[test]
fn test_spec_grammar() {
    let cases = [
        ("vfs_read", ProbeKind::Function, "", "vfs_read"),
        ("c:malloc", ProbeKind::Function, "c", "malloc"),
        ("p::do_fork", ProbeKind::Function, "", "do_fork"),
        ("p:c:free", ProbeKind::Function, "c", "free"),
        ("t:sched:sched_fork", ProbeKind::Tracepoint, "", "sched:sched_fork"),
        ("u:node:gc*", ProbeKind::Usdt, "node", "gc*"),
    ];
    for (pattern, kind, library, raw) in cases {
        let spec = ProbeSpec::parse(pattern, false).unwrap();
        assert_eq!((spec.kind, spec.library.as_str(), spec.raw_pattern.as_str()), (kind, library, raw));
    }

    for pattern in ["a:b:c:d", "t:a:b:c", "u:x:y:z:w"] {
        let err = ProbeSpec::parse(pattern, false).unwrap_err();
        assert!(err.to_string().contains("Too many ':'-separated components"), "{pattern}");
    }

    let err = ProbeSpec::parse("x:lib:func", false).unwrap_err();
    assert_eq!(err.to_string(), "Type must be 'p', 't', or 'u', but got x");
}

#[test]
fn test_glob_and_regex_matching() {
    let glob = ProbeSpec::parse("vfs_*", false).unwrap();
    assert!(glob.matches("vfs_read"));
    assert!(glob.matches("vfs_"));
    assert!(!glob.matches("do_vfs_read"));

    let regex = ProbeSpec::parse("^vfs.*", true).unwrap();
    assert!(regex.matches("vfs_write"));
    assert!(!regex.matches("do_vfs_write"));

    assert!(matches!(ProbeSpec::parse("vfs_(", true), Err(FuncCountError::InvalidSpec(_))));
}

#[test]
fn test_kernel_functions_in_discovery_order() {
    let discovery = FakeDiscovery {
        kernel: vec!["vfs_write", "do_vfs_read", "vfs_read", "vfs_open"],
        ..FakeDiscovery::default()
    };
    let probe = resolve("vfs_*", &discovery, None).unwrap();

    assert!(probe.library().is_none());
    assert_eq!(probe.matched(), 3);
    assert_eq!(probe.table.name(Location(0)), Some("vfs_write"));
    assert_eq!(probe.table.name(Location(1)), Some("vfs_read"));
    assert_eq!(probe.table.name(Location(2)), Some("vfs_open"));
    assert_eq!(probe.table.name(Location(3)), None);
}

#[test]
fn test_tracepoint_names_include_category() {
    let discovery = FakeDiscovery {
        tracepoints: vec!["sched:sched_fork", "sched:sched_switch", "syscalls:sys_enter_fork"],
        ..FakeDiscovery::default()
    };
    let probe = resolve("t:sched:sched_fork", &discovery, None).unwrap();
    assert_eq!(probe.matched(), 1);
    assert_eq!(probe.table.name(Location(0)), Some("sched:sched_fork"));
}

#[test]
fn test_user_functions_dedup_by_address_and_name() {
    let discovery = FakeDiscovery {
        functions: vec![("f1", 0xa1), ("f2", 0xa1), ("f1", 0xa2), ("f3", 0xa2)],
        ..FakeDiscovery::default()
    };
    let probe = resolve("c:f*", &discovery, None).unwrap();

    assert_eq!(probe.library(), Some(Path::new(LIBC)));
    assert_eq!(probe.matched(), 1);
    let matched = probe.table.get(Location(0)).unwrap();
    assert_eq!(matched.name, "f1");
    assert_eq!(matched.addresses, vec![0xa1]);
    assert_eq!(matched.binary.as_deref(), Some(Path::new(LIBC)));
}

#[test]
fn test_malloc_aliases_collapse() {
    let discovery = FakeDiscovery {
        functions: vec![("malloc", 0x1000), ("__libc_malloc", 0x1000), ("free", 0x2000)],
        ..FakeDiscovery::default()
    };
    let probe = resolve("c:*malloc", &discovery, None).unwrap();
    assert_eq!(probe.matched(), 1);
    assert_eq!(probe.table.name(Location(0)), Some("malloc"));
}

#[test]
fn test_no_match_is_an_error() {
    let discovery = FakeDiscovery { kernel: vec!["tcp_sendmsg"], ..FakeDiscovery::default() };
    let err = resolve("vfs_*", &discovery, None).unwrap_err();
    assert_eq!(err.to_string(), "No functions matched by pattern ^vfs_.*$");
}

#[test]
fn test_unknown_library() {
    let discovery = FakeDiscovery::default();
    let err = resolve("nosuchlib:foo", &discovery, None).unwrap_err();
    assert!(matches!(err, FuncCountError::NotFound(ref lib) if lib == "nosuchlib"));
    assert_eq!(discovery.enumerations.get(), 0);
}

#[test]
fn test_usdt_filtered_to_library_without_pid() {
    let discovery = FakeDiscovery {
        usdt: vec![
            usdt(NODE, "gc__start", vec![0x10, 0x20]),
            usdt("/usr/lib/libuv.so.1", "gc__done", vec![0x30]),
            usdt(NODE, "http__server__request", vec![0x40]),
        ],
        ..FakeDiscovery::default()
    };

    let probe = resolve("u:node:gc*", &discovery, None).unwrap();
    assert_eq!(probe.matched(), 1);
    assert_eq!(probe.table.get(Location(0)).unwrap().addresses, vec![0x10, 0x20]);

    let probe = resolve("u:node:gc*", &discovery, Some(Pid(185))).unwrap();
    assert_eq!(probe.matched(), 2);
    assert_eq!(probe.table.name(Location(1)), Some("gc__done"));
}

#[test]
fn test_too_many_matches() {
    let names: Vec<&'static str> = (0..300)
        .map(|i| &*Box::leak(format!("vfs_fn_{i}").into_boxed_str()))
        .collect();
    let discovery = FakeDiscovery { kernel: names, ..FakeDiscovery::default() };
    let err = resolve("vfs_*", &discovery, None).unwrap_err();
    assert!(matches!(err, FuncCountError::TooManyMatches { matched: 300, max: 256, .. }));
}
