//! Object File Loader
//!
//! Loads the code to recompile from either a MIPS ELF executable (via `goblin`)
//! or a raw binary blob placed at a configured base address.
//!
//! # ELF Handling
//! - Sections with `SHF_EXECINSTR` are code sections; `NOBITS` sections are skipped
//! - `STT_FUNC` symbols are collected as seed entry points with their names
//! - The ELF byte order overrides the configured one
//!
//! Addresses are 32-bit throughout; a section that does not fit the 32-bit
//! address space is rejected.

use crate::recompiler::config::Endianness;
use crate::recompiler::error::RecompilerError;
use goblin::elf::section_header::{SHF_EXECINSTR, SHT_NOBITS};
use goblin::elf::Elf;
use std::path::Path;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// One loaded section.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    /// Virtual load address
    pub address: u32,
    /// Section contents
    pub data: Vec<u8>,
    /// Whether the section holds code
    pub executable: bool,
}

impl Section {
    /// One-past-the-end virtual address.
    #[inline]
    pub fn end_address(&self) -> u32 {
        self.address.wrapping_add(self.data.len() as u32)
    }

    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.address && address < self.end_address()
    }
}

/// A function symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
    pub size: u32,
}

/// A parsed input file.
#[derive(Debug, Clone)]
pub struct ObjectFile {
    pub sections: Vec<Section>,
    /// Function symbols sorted by address
    pub symbols: Vec<Symbol>,
    pub entry_point: u32,
    /// Byte order declared by the file (`None` for raw binaries)
    pub endianness: Option<Endianness>,
    /// File path (for reference)
    pub path: String,
}

impl ObjectFile {
    /// Read and parse a file from disk.
    pub fn load(path: &Path, base_address: u32) -> Result<Self, RecompilerError> {
        let data: Vec<u8> = std::fs::read(path)?;
        Self::parse(&data, &path.display().to_string(), base_address)
    }

    /// Parse bytes as an ELF when they carry the ELF magic, else as a raw binary.
    pub fn parse(data: &[u8], path: &str, base_address: u32) -> Result<Self, RecompilerError> {
        if data.starts_with(ELF_MAGIC) {
            Self::from_elf(data, path)
        } else {
            Self::from_raw(data, path, base_address)
        }
    }

    /// Treat the whole buffer as one executable `.text` section at `base_address`.
    pub fn from_raw(data: &[u8], path: &str, base_address: u32) -> Result<Self, RecompilerError> {
        if data.is_empty() {
            return Err(RecompilerError::object_parse(format!("{} is empty", path)));
        }
        if base_address as u64 + data.len() as u64 > u32::MAX as u64 + 1 {
            return Err(RecompilerError::invalid_range(base_address as u64, data.len() as u64));
        }
        log::info!(
            "Loaded raw binary {} ({} bytes at 0x{:08X})",
            path,
            data.len(),
            base_address
        );
        Ok(Self {
            sections: vec![Section {
                name: ".text".to_string(),
                address: base_address,
                data: data.to_vec(),
                executable: true,
            }],
            symbols: Vec::new(),
            entry_point: base_address,
            endianness: None,
            path: path.to_string(),
        })
    }

    /// Parse an ELF executable.
    #[inline(never)]
    pub fn from_elf(data: &[u8], path: &str) -> Result<Self, RecompilerError> {
        let elf: Elf = Elf::parse(data)?;
        if elf.header.e_machine != goblin::elf::header::EM_MIPS {
            log::warn!(
                "{}: e_machine is {} (not MIPS), decoding anyway",
                path,
                elf.header.e_machine
            );
        }

        let mut sections: Vec<Section> = Vec::with_capacity(elf.section_headers.len());
        for header in elf.section_headers.iter() {
            if header.sh_type == SHT_NOBITS || header.sh_size == 0 {
                continue;
            }
            let name: &str = elf.shdr_strtab.get_at(header.sh_name).unwrap_or("");
            if header.sh_addr + header.sh_size > u32::MAX as u64 + 1 {
                return Err(RecompilerError::invalid_range(header.sh_addr, header.sh_size));
            }
            let start: usize = header.sh_offset as usize;
            let end: usize = start.saturating_add(header.sh_size as usize);
            let bytes: &[u8] = data.get(start..end).ok_or_else(|| {
                RecompilerError::object_parse(format!(
                    "section {} extends beyond file: offset {}, size {}",
                    name, header.sh_offset, header.sh_size
                ))
            })?;
            sections.push(Section {
                name: name.to_string(),
                address: header.sh_addr as u32,
                data: bytes.to_vec(),
                executable: header.sh_flags & SHF_EXECINSTR as u64 != 0,
            });
        }

        let mut symbols: Vec<Symbol> = elf
            .syms
            .iter()
            .filter(|sym| sym.is_function() && sym.st_value != 0)
            .filter_map(|sym| {
                let name: &str = elf.strtab.get_at(sym.st_name)?;
                Some(Symbol {
                    name: name.to_string(),
                    address: sym.st_value as u32,
                    size: sym.st_size as u32,
                })
            })
            .collect();
        symbols.sort_by_key(|sym| sym.address);
        symbols.dedup_by_key(|sym| sym.address);

        let endianness: Endianness = if elf.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };
        log::info!(
            "Loaded ELF {} ({} sections, {} function symbols, entry 0x{:08X})",
            path,
            sections.len(),
            symbols.len(),
            elf.entry
        );

        Ok(Self {
            sections,
            symbols,
            entry_point: elf.entry as u32,
            endianness: Some(endianness),
            path: path.to_string(),
        })
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Sections selected for recompilation: the named ones, or every
    /// executable section when `names` is empty.
    pub fn code_sections(&self, names: &[String]) -> Result<Vec<&Section>, RecompilerError> {
        if names.is_empty() {
            let code: Vec<&Section> = self.sections.iter().filter(|s| s.executable).collect();
            if code.is_empty() {
                return Err(RecompilerError::section_not_found("<any executable section>"));
            }
            return Ok(code);
        }
        names
            .iter()
            .map(|name| {
                self.section(name)
                    .ok_or_else(|| RecompilerError::section_not_found(name.as_str()))
            })
            .collect()
    }

    /// Symbol starting exactly at `address`.
    pub fn symbol_at(&self, address: u32) -> Option<&Symbol> {
        self.symbols
            .binary_search_by_key(&address, |sym| sym.address)
            .ok()
            .map(|index| &self.symbols[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_binary() {
        let object = ObjectFile::parse(&[0u8; 16], "blob.bin", 0x0010_0000).unwrap();
        assert_eq!(object.sections.len(), 1);
        let text = object.section(".text").unwrap();
        assert_eq!(text.address, 0x0010_0000);
        assert_eq!(text.end_address(), 0x0010_0010);
        assert!(text.contains(0x0010_000C));
        assert!(!text.contains(0x0010_0010));
        assert_eq!(object.entry_point, 0x0010_0000);
        assert!(object.endianness.is_none());
    }

    #[test]
    fn test_raw_binary_rejects_wrapping_range() {
        let err = ObjectFile::from_raw(&[0u8; 16], "blob.bin", 0xFFFF_FFF8).unwrap_err();
        assert!(matches!(err, RecompilerError::InvalidRange { .. }));
        assert!(ObjectFile::from_raw(&[], "empty.bin", 0).is_err());
    }

    #[test]
    fn test_truncated_elf_is_parse_error() {
        let err = ObjectFile::parse(b"\x7fELF\x01\x01", "bad.elf", 0).unwrap_err();
        assert!(matches!(err, RecompilerError::ObjectParse { .. }));
    }

    #[test]
    fn test_missing_section() {
        let object = ObjectFile::from_raw(&[0u8; 4], "blob.bin", 0).unwrap();
        assert!(object.code_sections(&[".data".to_string()]).is_err());
        assert_eq!(object.code_sections(&[]).unwrap().len(), 1);
    }
}
