// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Executable image headers (PE, ELF, Mach-O).
//!
//! Only what the loader checks need: container format, target machine, and
//! for PE images the list of imported DLLs.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Bytes read from the start of an image for header detection.
const HEADER_PROBE_LEN: u64 = 64 * 1024;

const PE_MACHINE_I386: u16 = 0x014c;
const PE_MACHINE_AMD64: u16 = 0x8664;
const PE_MACHINE_ARMNT: u16 = 0x01c4;
const PE_MACHINE_ARM64: u16 = 0xaa64;

const ELF_MACHINE_386: u16 = 3;
const ELF_MACHINE_ARM: u16 = 40;
const ELF_MACHINE_X86_64: u16 = 62;
const ELF_MACHINE_AARCH64: u16 = 183;

const MACHO_CPU_X86: u32 = 7;
const MACHO_CPU_X86_64: u32 = 0x0100_0007;
const MACHO_CPU_ARM: u32 = 12;
const MACHO_CPU_ARM64: u32 = 0x0100_000c;

const MACHO_MAGIC_32: u32 = 0xfeed_face;
const MACHO_MAGIC_64: u32 = 0xfeed_facf;
const MACHO_FAT_MAGIC: u32 = 0xcafe_babe;

/// Image container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Pe,
    Elf,
    MachO,
    /// Mach-O universal binary.
    MachOFat,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Pe => "PE",
            ImageFormat::Elf => "ELF",
            ImageFormat::MachO => "Mach-O",
            ImageFormat::MachOFat => "Mach-O universal",
        };
        f.write_str(name)
    }
}

/// Target machine of an image or of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineArch {
    X86,
    X86_64,
    Arm,
    Aarch64,
    /// Raw machine code not mapped above.
    Unknown(u32),
}

impl MachineArch {
    /// Architecture this process was compiled for.
    pub const fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            MachineArch::X86_64
        } else if cfg!(target_arch = "x86") {
            MachineArch::X86
        } else if cfg!(target_arch = "aarch64") {
            MachineArch::Aarch64
        } else if cfg!(target_arch = "arm") {
            MachineArch::Arm
        } else {
            MachineArch::Unknown(0)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MachineArch::X86 => "x86",
            MachineArch::X86_64 => "x86_64",
            MachineArch::Arm => "arm",
            MachineArch::Aarch64 => "aarch64",
            MachineArch::Unknown(_) => "unknown",
        }
    }

    fn from_pe(machine: u16) -> Self {
        match machine {
            PE_MACHINE_I386 => MachineArch::X86,
            PE_MACHINE_AMD64 => MachineArch::X86_64,
            PE_MACHINE_ARMNT => MachineArch::Arm,
            PE_MACHINE_ARM64 => MachineArch::Aarch64,
            other => MachineArch::Unknown(u32::from(other)),
        }
    }

    fn from_elf(machine: u16) -> Self {
        match machine {
            ELF_MACHINE_386 => MachineArch::X86,
            ELF_MACHINE_X86_64 => MachineArch::X86_64,
            ELF_MACHINE_ARM => MachineArch::Arm,
            ELF_MACHINE_AARCH64 => MachineArch::Aarch64,
            other => MachineArch::Unknown(u32::from(other)),
        }
    }

    fn from_macho(cpu: u32) -> Self {
        match cpu {
            MACHO_CPU_X86 => MachineArch::X86,
            MACHO_CPU_X86_64 => MachineArch::X86_64,
            MACHO_CPU_ARM => MachineArch::Arm,
            MACHO_CPU_ARM64 => MachineArch::Aarch64,
            other => MachineArch::Unknown(other),
        }
    }
}

impl fmt::Display for MachineArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineArch::Unknown(code) => write!(f, "unknown(0x{code:x})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Header summary of one image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    /// One entry, except for universal binaries.
    pub arches: Vec<MachineArch>,
}

impl ImageInfo {
    /// Whether a process of architecture `arch` can map this image.
    pub fn supports(&self, arch: MachineArch) -> bool {
        self.arches.contains(&arch)
    }

    /// Architecture reported in mismatch errors.
    pub fn primary(&self) -> MachineArch {
        self.arches
            .first()
            .copied()
            .unwrap_or(MachineArch::Unknown(0))
    }
}

/// Parse the header of an in-memory image.
pub fn detect(bytes: &[u8]) -> Result<ImageInfo, String> {
    if bytes.starts_with(b"MZ") {
        return detect_pe(bytes);
    }
    if bytes.starts_with(b"\x7fELF") {
        return detect_elf(bytes);
    }
    if bytes.len() >= 8 {
        match LittleEndian::read_u32(&bytes[0..4]) {
            MACHO_MAGIC_32 | MACHO_MAGIC_64 => {
                return Ok(ImageInfo {
                    format: ImageFormat::MachO,
                    arches: vec![MachineArch::from_macho(LittleEndian::read_u32(&bytes[4..8]))],
                });
            }
            _ => {}
        }
        if BigEndian::read_u32(&bytes[0..4]) == MACHO_FAT_MAGIC {
            return detect_fat(bytes);
        }
    }
    Err("not a PE, ELF or Mach-O image".to_string())
}

/// Read and parse the header of the image at `path`.
pub fn read_image(path: &Path) -> Result<ImageInfo, String> {
    let file = File::open(path).map_err(|err| err.to_string())?;
    let mut head = Vec::new();
    file.take(HEADER_PROBE_LEN)
        .read_to_end(&mut head)
        .map_err(|err| err.to_string())?;
    detect(&head)
}

fn pe_header_offset(bytes: &[u8]) -> Result<usize, String> {
    let e_lfanew = bytes
        .get(0x3c..0x40)
        .map(LittleEndian::read_u32)
        .ok_or("truncated DOS header")? as usize;
    match bytes.get(e_lfanew..e_lfanew + 4) {
        Some(b"PE\0\0") => Ok(e_lfanew),
        Some(_) => Err("missing PE signature".to_string()),
        None => Err("PE header beyond end of file".to_string()),
    }
}

fn detect_pe(bytes: &[u8]) -> Result<ImageInfo, String> {
    let pe = pe_header_offset(bytes)?;
    let machine = bytes
        .get(pe + 4..pe + 6)
        .map(LittleEndian::read_u16)
        .ok_or("truncated COFF header")?;
    Ok(ImageInfo {
        format: ImageFormat::Pe,
        arches: vec![MachineArch::from_pe(machine)],
    })
}

fn detect_elf(bytes: &[u8]) -> Result<ImageInfo, String> {
    let field = bytes.get(18..20).ok_or("truncated ELF header")?;
    let machine = match bytes[5] {
        1 => LittleEndian::read_u16(field),
        2 => BigEndian::read_u16(field),
        other => return Err(format!("invalid ELF data encoding {other}")),
    };
    Ok(ImageInfo {
        format: ImageFormat::Elf,
        arches: vec![MachineArch::from_elf(machine)],
    })
}

fn detect_fat(bytes: &[u8]) -> Result<ImageInfo, String> {
    let count = BigEndian::read_u32(&bytes[4..8]) as usize;
    let mut arches = Vec::with_capacity(count.min(8));
    for index in 0..count {
        let entry = 8 + index * 20;
        let cpu = bytes
            .get(entry..entry + 4)
            .map(BigEndian::read_u32)
            .ok_or("truncated fat header")?;
        arches.push(MachineArch::from_macho(cpu));
    }
    if arches.is_empty() {
        return Err("universal binary without slices".to_string());
    }
    Ok(ImageInfo {
        format: ImageFormat::MachOFat,
        arches,
    })
}

/// DLL names listed in the import directory of a PE image.
///
/// Returns an empty list for non-PE images.
pub fn pe_imports(bytes: &[u8]) -> Result<Vec<String>, String> {
    if !bytes.starts_with(b"MZ") {
        return Ok(Vec::new());
    }
    let pe = pe_header_offset(bytes)?;
    let u16_at = |offset: usize| bytes.get(offset..offset + 2).map(LittleEndian::read_u16);
    let u32_at = |offset: usize| bytes.get(offset..offset + 4).map(LittleEndian::read_u32);

    let sections = u16_at(pe + 6).ok_or("truncated COFF header")? as usize;
    let optional_size = u16_at(pe + 20).ok_or("truncated COFF header")? as usize;
    let optional = pe + 24;
    let directories = match u16_at(optional).ok_or("truncated optional header")? {
        0x10b => optional + 96,
        0x20b => optional + 112,
        magic => return Err(format!("unknown optional header magic 0x{magic:x}")),
    };
    // Directory entry 1 is the import table.
    let import_rva = u32_at(directories + 8).ok_or("truncated data directories")?;
    if import_rva == 0 {
        return Ok(Vec::new());
    }

    let table = optional + optional_size;
    let rva_to_offset = |rva: u32| -> Option<usize> {
        (0..sections).find_map(|index| {
            let header = table + index * 40;
            let virtual_size = u32_at(header + 8)?;
            let virtual_address = u32_at(header + 12)?;
            let raw_size = u32_at(header + 16)?;
            let raw_pointer = u32_at(header + 20)?;
            let span = virtual_size.max(raw_size);
            (rva >= virtual_address && rva - virtual_address < span)
                .then(|| (rva - virtual_address) as usize + raw_pointer as usize)
        })
    };

    let mut descriptor = rva_to_offset(import_rva).ok_or("import table outside sections")?;
    let mut names = Vec::new();
    loop {
        let name_rva = u32_at(descriptor + 12).ok_or("truncated import descriptor")?;
        if name_rva == 0 {
            break;
        }
        let start = rva_to_offset(name_rva).ok_or("import name outside sections")?;
        let tail = bytes.get(start..).ok_or("import name beyond end of file")?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or("unterminated import name")?;
        names.push(String::from_utf8_lossy(&tail[..end]).into_owned());
        descriptor += 20;
    }
    Ok(names)
}
