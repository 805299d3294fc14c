//! Library and executable lookup
//!
//! Turns the short names users type (`c:malloc`, `u:node:gc*`, `bash:readline`)
//! into paths:
//!
//! 1. anything containing `/` is already a path
//! 2. with a target process, the library it actually mapped
//! 3. the dynamic linker cache (`/etc/ld.so.cache`)
//! 4. the standard library directories
//!
//! Executables are looked up on `PATH`.

use log::debug;
use std::env;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::memory_maps::find_mapped_library;
use crate::domain::Pid;

const LD_SO_CACHE: &str = "/etc/ld.so.cache";

/// Searched when the linker cache is missing or does not know the library
const LIBRARY_DIRS: [&str; 9] = [
    "/lib64",
    "/usr/lib64",
    "/lib",
    "/usr/lib",
    "/lib/x86_64-linux-gnu",
    "/usr/lib/x86_64-linux-gnu",
    "/lib/aarch64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/local/lib",
];

/// Find the shared library `lib<name>.so*`
#[must_use]
pub fn find_library(name: &str, pid: Option<Pid>) -> Option<PathBuf> {
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }
    if name.is_empty() {
        return None;
    }

    if let Some(pid) = pid {
        if let Some(path) = find_mapped_library(pid, name) {
            debug!("Found lib{name} mapped into {pid}: {}", path.display());
            return Some(path);
        }
    }

    match fs::read(LD_SO_CACHE) {
        Ok(bytes) => match LdCache::parse(&bytes) {
            Some(cache) => {
                if let Some(path) = cache.lookup(name) {
                    return Some(path);
                }
            }
            None => debug!("{LD_SO_CACHE} is not a linker cache we can read"),
        },
        Err(e) => debug!("Cannot read {LD_SO_CACHE}: {e}"),
    }

    LIBRARY_DIRS.iter().find_map(|dir| find_in_dir(Path::new(dir), name))
}

/// Find an executable by path or on `PATH`
#[must_use]
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    if name.is_empty() {
        return None;
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Whether the file starts with an ELF header
///
/// Development symlinks like `libc.so` are often linker scripts.
fn is_elf(path: &Path) -> bool {
    let mut ident = [0u8; 16];
    let read = File::open(path).and_then(|mut file| file.read_exact(&mut ident));
    read.is_ok()
        && matches!(
            object::FileKind::parse(&ident[..]),
            Ok(object::FileKind::Elf32 | object::FileKind::Elf64)
        )
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let prefix = format!("lib{name}.so");
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            entry.file_name().to_string_lossy().starts_with(&prefix).then(|| entry.path())
        })
        .collect();
    candidates.sort();
    candidates.into_iter().find(|path| {
        let elf = is_elf(path);
        if !elf {
            debug!("Skipping {}: not an ELF object", path.display());
        }
        elf
    })
}

// ============================================================================
// ld.so.cache
// ============================================================================
//
// Two layouts exist. glibc >= 2.32 writes only the new table:
//
//   "glibc-ld.so.cache1.1" | nlibs | strings_len | pad | 24-byte entries | strings
//
// Older ldconfig writes the compat layout: the old table (string offsets
// relative to its string area) followed, at the next 8-byte boundary, by a
// complete new table (string offsets relative to the new header). Very old
// caches stop after the old table.

const CACHE_MAGIC: &[u8] = b"glibc-ld.so.cache1.1";
const CACHE_HEADER_LEN: usize = 48;
const CACHE_ENTRY_LEN: usize = 24;

const OLD_CACHE_MAGIC: &[u8] = b"ld.so-1.7.0";
/// Magic padded to 12, then the entry count
const OLD_CACHE_HEADER_LEN: usize = 16;
const OLD_CACHE_ENTRY_LEN: usize = 12;

const FLAG_TYPE_MASK: i32 = 0x00ff;
const FLAG_ELF_LIBC6: i32 = 0x0003;
const FLAG_ABI_MASK: i32 = 0xff00;
/// ABI tags ldconfig uses for 64-bit libraries (sparc, ia64, x86-64, s390, ppc, aarch64, riscv)
const ABI_LIB64: [i32; 7] = [0x0100, 0x0200, 0x0300, 0x0400, 0x0500, 0x0a00, 0x1000];

/// One `lib<name>.so → path` entry of the linker cache
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    flags: i32,
    soname: String,
    path: PathBuf,
}

/// Parsed dynamic linker cache
#[derive(Debug, Default)]
pub struct LdCache {
    entries: Vec<CacheEntry>,
}

impl LdCache {
    /// Parse a new-format or compat-layout cache; `None` for anything else
    ///
    /// In the compat layout the embedded new table is preferred, and the old
    /// table is used when there is none.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if !bytes.starts_with(OLD_CACHE_MAGIC) {
            return Self::parse_new(bytes);
        }

        let nlibs = read_u32(bytes, OLD_CACHE_MAGIC.len() + 1)? as usize;
        let table_end = OLD_CACHE_HEADER_LEN + nlibs * OLD_CACHE_ENTRY_LEN;
        let new_start = (table_end + 7) & !7;
        if let Some(cache) = bytes.get(new_start..).and_then(Self::parse_new) {
            return Some(cache);
        }

        let entries = read_entries(bytes, nlibs, OLD_CACHE_HEADER_LEN, OLD_CACHE_ENTRY_LEN, table_end)?;
        Some(Self { entries })
    }

    fn parse_new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CACHE_HEADER_LEN || !bytes.starts_with(CACHE_MAGIC) {
            return None;
        }
        let nlibs = read_u32(bytes, 20)? as usize;
        let entries = read_entries(bytes, nlibs, CACHE_HEADER_LEN, CACHE_ENTRY_LEN, 0)?;
        Some(Self { entries })
    }

    /// First entry whose soname starts with `lib<name>.so` and matches our ABI
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        let soname = format!("lib{name}.so");
        self.entries
            .iter()
            .find(|entry| entry.soname.starts_with(&soname) && matches_host_abi(entry.flags))
            .map(|entry| entry.path.clone())
    }
}

fn matches_host_abi(flags: i32) -> bool {
    if flags & FLAG_TYPE_MASK != FLAG_ELF_LIBC6 {
        return false;
    }
    let lib64 = ABI_LIB64.contains(&(flags & FLAG_ABI_MASK));
    lib64 == cfg!(target_pointer_width = "64")
}

/// Read `nlibs` `(flags, key, value)` entries; string offsets are relative to `strings`
fn read_entries(
    bytes: &[u8],
    nlibs: usize,
    table: usize,
    entry_len: usize,
    strings: usize,
) -> Option<Vec<CacheEntry>> {
    (0..nlibs)
        .map(|i| {
            let base = table + i * entry_len;
            #[allow(clippy::cast_possible_wrap)]
            let flags = read_u32(bytes, base)? as i32;
            let soname = read_cstr(bytes, strings + read_u32(bytes, base + 4)? as usize)?;
            let path = read_cstr(bytes, strings + read_u32(bytes, base + 8)? as usize)?;
            Some(CacheEntry { flags, soname, path: PathBuf::from(path) })
        })
        .collect()
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_ne_bytes(raw.try_into().ok()?))
}

fn read_cstr(bytes: &[u8], offset: usize) -> Option<String> {
    let rest = bytes.get(offset..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal new-format cache holding `(flags, soname, path)` entries
    fn build_cache(entries: &[(i32, &str, &str)]) -> Vec<u8> {
        let strings_start = CACHE_HEADER_LEN + entries.len() * CACHE_ENTRY_LEN;
        let mut strings = Vec::new();
        let mut table = Vec::new();
        for (flags, soname, path) in entries {
            let key = strings_start + strings.len();
            strings.extend_from_slice(soname.as_bytes());
            strings.push(0);
            let value = strings_start + strings.len();
            strings.extend_from_slice(path.as_bytes());
            strings.push(0);

            table.extend_from_slice(&flags.to_ne_bytes());
            table.extend_from_slice(&u32::try_from(key).unwrap().to_ne_bytes());
            table.extend_from_slice(&u32::try_from(value).unwrap().to_ne_bytes());
            table.extend_from_slice(&0u32.to_ne_bytes());
            table.extend_from_slice(&0u64.to_ne_bytes());
        }

        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&u32::try_from(entries.len()).unwrap().to_ne_bytes());
        bytes.extend_from_slice(&u32::try_from(strings.len()).unwrap().to_ne_bytes());
        bytes.resize(CACHE_HEADER_LEN, 0);
        bytes.extend_from_slice(&table);
        bytes.extend_from_slice(&strings);
        bytes
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ld_cache_lookup_prefers_host_abi() {
        let bytes = build_cache(&[
            (0x0003, "libc.so.6", "/usr/lib32/libc.so.6"),
            (0x0303, "libc.so.6", "/usr/lib/x86_64-linux-gnu/libc.so.6"),
            (0x0303, "libcrypt.so.1", "/usr/lib/x86_64-linux-gnu/libcrypt.so.1"),
        ]);
        let cache = LdCache::parse(&bytes).unwrap();
        assert_eq!(cache.lookup("c"), Some(PathBuf::from("/usr/lib/x86_64-linux-gnu/libc.so.6")));
        assert_eq!(
            cache.lookup("crypt"),
            Some(PathBuf::from("/usr/lib/x86_64-linux-gnu/libcrypt.so.1"))
        );
        assert_eq!(cache.lookup("ssl"), None);
    }

    /// Build an old-format table for `(flags, soname, path)` entries
    fn build_old_cache(entries: &[(i32, &str, &str)]) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut table = Vec::new();
        for (flags, soname, path) in entries {
            table.extend_from_slice(&flags.to_ne_bytes());
            table.extend_from_slice(&u32::try_from(strings.len()).unwrap().to_ne_bytes());
            strings.extend_from_slice(soname.as_bytes());
            strings.push(0);
            table.extend_from_slice(&u32::try_from(strings.len()).unwrap().to_ne_bytes());
            strings.extend_from_slice(path.as_bytes());
            strings.push(0);
        }

        let mut bytes = OLD_CACHE_MAGIC.to_vec();
        bytes.push(0);
        bytes.extend_from_slice(&u32::try_from(entries.len()).unwrap().to_ne_bytes());
        bytes.extend_from_slice(&table);
        bytes.extend_from_slice(&strings);
        bytes
    }

    /// Old table, padded to 8 bytes, then a complete new-format cache
    fn build_compat_cache(old: &[(i32, &str, &str)], new: &[(i32, &str, &str)]) -> Vec<u8> {
        let table_end = OLD_CACHE_HEADER_LEN + old.len() * OLD_CACHE_ENTRY_LEN;
        let mut bytes = build_old_cache(old);
        // Only the embedded table is read, so the old strings are left out
        bytes.truncate(table_end);
        bytes.resize((table_end + 7) & !7, 0);
        bytes.extend_from_slice(&build_cache(new));
        bytes
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ld_cache_compat_layout_uses_embedded_table() {
        let bytes = build_compat_cache(
            &[(0x0303, "libz.so.1", "/lib/libz.so.1")],
            &[(0x0303, "libc.so.6", "/lib/x86_64-linux-gnu/libc.so.6")],
        );
        assert!(!bytes.starts_with(CACHE_MAGIC));
        let cache = LdCache::parse(&bytes).unwrap();
        assert_eq!(cache.lookup("c"), Some(PathBuf::from("/lib/x86_64-linux-gnu/libc.so.6")));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ld_cache_old_table_only() {
        let bytes = build_old_cache(&[
            (0x0303, "libm.so.6", "/lib/libm.so.6"),
            (0x0303, "libc.so.6", "/lib/libc.so.6"),
        ]);
        let cache = LdCache::parse(&bytes).unwrap();
        assert_eq!(cache.lookup("c"), Some(PathBuf::from("/lib/libc.so.6")));
        assert_eq!(cache.lookup("m"), Some(PathBuf::from("/lib/libm.so.6")));
    }

    #[test]
    fn test_ld_cache_rejects_other_formats() {
        assert!(LdCache::parse(b"ld.so-1.7.0\0\x05\0\0\0").is_none());
        assert!(LdCache::parse(b"not a linker cache at all, just some bytes here").is_none());
        assert!(LdCache::parse(&[]).is_none());
    }

    #[test]
    fn test_ld_cache_truncated_table() {
        let mut bytes = build_cache(&[(0x0303, "libc.so.6", "/lib/libc.so.6")]);
        bytes.truncate(CACHE_HEADER_LEN + 10);
        assert!(LdCache::parse(&bytes).is_none());
    }

    #[test]
    fn test_find_library_path_passthrough() {
        assert_eq!(find_library("/opt/app/libfoo.so", None), Some(PathBuf::from("/opt/app/libfoo.so")));
        assert_eq!(find_library("", None), None);
    }

    /// Enough of an ELF64 header for the magic check
    const ELF_IDENT: &[u8] = b"\x7fELF\x02\x01\x01\0\0\0\0\0\0\0\0\0";

    #[test]
    fn test_find_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("libfoo.so.2"), ELF_IDENT).unwrap();
        fs::write(dir.path().join("libfoo.so.1"), ELF_IDENT).unwrap();
        fs::write(dir.path().join("libfoobar.so"), ELF_IDENT).unwrap();
        assert_eq!(find_in_dir(dir.path(), "foo"), Some(dir.path().join("libfoo.so.1")));
        assert_eq!(find_in_dir(dir.path(), "baz"), None);
    }

    #[test]
    fn test_find_in_dir_skips_linker_scripts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("libc.so"),
            b"/* GNU ld script */\nGROUP ( /lib/libc.so.6 /usr/lib/libc_nonshared.a )\n",
        )
        .unwrap();
        fs::write(dir.path().join("libc.so.6"), ELF_IDENT).unwrap();
        assert_eq!(find_in_dir(dir.path(), "c"), Some(dir.path().join("libc.so.6")));
    }

    #[test]
    fn test_find_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool");
        fs::write(&exe, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        let data = dir.path().join("data");
        fs::write(&data, b"").unwrap();

        assert_eq!(find_executable(exe.to_str().unwrap()), Some(exe.clone()));
        assert_eq!(find_executable(data.to_str().unwrap()), None);
        assert_eq!(find_executable(""), None);
    }
}
