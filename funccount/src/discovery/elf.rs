//! ELF inspection for user-space probes
//!
//! - **Function symbols**: `.symtab` followed by `.dynsym`. A stripped library
//!   still exports its dynamic symbols, so both tables are read; duplicates are
//!   resolved later by the match table, not here.
//! - **USDT notes**: each `.note.stapsdt` note describes one probe site:
//!
//! ```text
//! owner "stapsdt", type 3
//! pc, base, semaphore            address-sized
//! provider\0 name\0 args\0
//! ```
//!
//! Note headers are walked by `object`; only the descriptor is decoded here.
//!
//! When the binary was prelinked, `pc` is shifted by the distance between the
//! recorded `base` and the actual `.stapsdt.base` section address.

use object::elf::{FileHeader32, FileHeader64};
use object::read::elf::{FileHeader, SectionHeader};
use object::{BinaryFormat, Endian, Endianness, Object, ObjectSection, ObjectSymbol, SymbolKind};
use std::fs;
use std::path::Path;

use super::{UsdtProbe, UserFunction};
use crate::domain::{FuncCountError, Result};

const STAPSDT_NOTE_SECTION: &str = ".note.stapsdt";
const STAPSDT_BASE_SECTION: &str = ".stapsdt.base";
const STAPSDT_NOTE_NAME: &[u8] = b"stapsdt";
const STAPSDT_NOTE_TYPE: u32 = 3;

fn read_binary(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| FuncCountError::discovery(path, e))
}

fn parse_object<'a>(path: &Path, data: &'a [u8]) -> Result<object::File<'a>> {
    object::File::parse(data).map_err(|e| {
        FuncCountError::discovery(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Defined function symbols with a non-zero address, symbol table order
///
/// # Errors
/// Returns an error if the file cannot be read or is not an object file
pub fn function_symbols(path: &Path) -> Result<Vec<UserFunction>> {
    let data = read_binary(path)?;
    let obj = parse_object(path, &data)?;

    Ok(obj
        .symbols()
        .chain(obj.dynamic_symbols())
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition() && sym.address() != 0)
        .filter_map(|sym| {
            let name = sym.name().ok()?;
            (!name.is_empty()).then(|| UserFunction::new(name, sym.address()))
        })
        .collect())
}

/// USDT probes declared in `path`, grouped by `provider:name` in first-seen order
///
/// # Errors
/// Returns an error if the file cannot be read or is not an object file
pub fn usdt_probes(path: &Path) -> Result<Vec<UsdtProbe>> {
    let data = read_binary(path)?;
    let obj = parse_object(path, &data)?;
    if obj.format() != BinaryFormat::Elf {
        return Ok(Vec::new());
    }

    let notes = if obj.is_64() {
        stapsdt_notes::<FileHeader64<Endianness>>(&data)
    } else {
        stapsdt_notes::<FileHeader32<Endianness>>(&data)
    }
    .map_err(|e| {
        FuncCountError::discovery(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    let actual_base = obj.section_by_name(STAPSDT_BASE_SECTION).map(|s| s.address());

    let mut probes: Vec<UsdtProbe> = Vec::new();
    for note in notes {
        let pc = match actual_base {
            Some(base) if note.base != 0 => note.pc.wrapping_add(base).wrapping_sub(note.base),
            _ => note.pc,
        };
        let Some(offset) = file_offset(&obj, pc) else {
            log::debug!("USDT {}:{} at 0x{pc:x} is outside any section", note.provider, note.name);
            continue;
        };
        let semaphore = (note.semaphore != 0).then_some(note.semaphore);

        match probes.iter_mut().find(|p| p.provider == note.provider && p.name == note.name) {
            Some(probe) => probe.locations.push(offset),
            None => probes.push(UsdtProbe {
                binary: path.to_path_buf(),
                provider: note.provider,
                name: note.name,
                locations: vec![offset],
                semaphore,
            }),
        }
    }

    Ok(probes)
}

/// Translate a virtual address into an offset within the file
fn file_offset(obj: &object::File<'_>, address: u64) -> Option<u64> {
    obj.sections().find_map(|section| {
        let start = section.address();
        if address < start || address >= start + section.size() {
            return None;
        }
        let (file_start, _) = section.file_range()?;
        Some(address - start + file_start)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StapsdtNote {
    pc: u64,
    base: u64,
    semaphore: u64,
    provider: String,
    name: String,
}

/// USDT notes of `.note.stapsdt`; notes of other owners or types are skipped
fn stapsdt_notes<Elf>(data: &[u8]) -> object::read::Result<Vec<StapsdtNote>>
where
    Elf: FileHeader<Endian = Endianness>,
{
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let sections = header.sections(endian, data)?;
    let Some((_, section)) = sections.section_by_name(endian, STAPSDT_NOTE_SECTION.as_bytes())
    else {
        return Ok(Vec::new());
    };
    let Some(mut notes) = section.notes(endian, data)? else {
        return Ok(Vec::new());
    };

    let mut found = Vec::new();
    while let Some(note) = notes.next()? {
        if note.n_type(endian) != STAPSDT_NOTE_TYPE || note.name() != STAPSDT_NOTE_NAME {
            continue;
        }
        if let Some(stapsdt) = parse_stapsdt_desc(note.desc(), endian, header.is_type_64()) {
            found.push(stapsdt);
        }
    }
    Ok(found)
}

/// `pc, base, semaphore` (address-sized) then `provider\0 name\0 args\0`
fn parse_stapsdt_desc(desc: &[u8], endian: Endianness, is_64: bool) -> Option<StapsdtNote> {
    let size = if is_64 { 8 } else { 4 };
    let addr_at = |index: usize| -> Option<u64> {
        let raw = desc.get(index * size..(index + 1) * size)?;
        if is_64 {
            Some(endian.read_u64_bytes(raw.try_into().ok()?))
        } else {
            Some(u64::from(endian.read_u32_bytes(raw.try_into().ok()?)))
        }
    };
    let pc = addr_at(0)?;
    let base = addr_at(1)?;
    let semaphore = addr_at(2)?;

    let mut strings = desc.get(3 * size..)?.split(|&b| b == 0);
    let provider = String::from_utf8_lossy(strings.next()?).into_owned();
    let name = String::from_utf8_lossy(strings.next()?).into_owned();
    if provider.is_empty() || name.is_empty() {
        return None;
    }

    Some(StapsdtNote { pc, base, semaphore, provider, name })
}
