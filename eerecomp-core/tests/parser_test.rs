//! Object file parsing tests

mod utils;

use eerecomp_core::recompiler::config::{Endianness, RecompilerConfig};
use eerecomp_core::recompiler::parser::ObjectFile;
use eerecomp_core::recompiler::pipeline::RecompilationPipeline;
use eerecomp_core::runtime::context::reg;
use std::io::Write;
use utils::*;

// main: jal helper ; nop ; jr $ra ; nop
// helper (BASE + 0x10): addiu $v0, $zero, 1 ; jr $ra ; nop
fn program() -> Vec<u32> {
    vec![
        jal(BASE + 0x10),
        nop(),
        jr(reg::RA),
        nop(),
        addiu(reg::V0, reg::ZERO, 1),
        jr(reg::RA),
        nop(),
    ]
}

fn elf() -> Vec<u8> {
    build_elf(
        &program(),
        BASE,
        BASE,
        &[("helper", BASE + 0x10, 12), ("main", BASE, 16)],
    )
}

#[test]
fn test_parse_elf_sections_and_symbols() {
    let object = ObjectFile::parse(&elf(), "game.elf", 0).unwrap();
    assert_eq!(object.entry_point, BASE);
    assert_eq!(object.endianness, Some(Endianness::Little));

    let text = object.section(".text").unwrap();
    assert!(text.executable);
    assert_eq!(text.address, BASE);
    assert_eq!(text.data.len(), 28);
    assert!(!object.section(".symtab").map_or(false, |s| s.executable));

    // sorted by address
    let names: Vec<&str> = object.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["main", "helper"]);
    assert_eq!(object.symbol_at(BASE + 0x10).map(|s| s.size), Some(12));
    assert!(object.symbol_at(BASE + 4).is_none());
}

#[test]
fn test_every_executable_section_when_none_named() {
    let object = ObjectFile::parse(&elf(), "game.elf", 0).unwrap();
    let code = object.code_sections(&[]).unwrap();
    assert_eq!(code.len(), 1);
    assert_eq!(code[0].name, ".text");
}

#[test]
fn test_symbols_name_functions() {
    let object = ObjectFile::parse(&elf(), "game.elf", 0).unwrap();
    let output = RecompilationPipeline::run(&object, &RecompilerConfig::default()).unwrap();
    let names: Vec<&str> = output.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["main", "helper"]);
    assert!(output.code.contains("pub fn main_00100000("));
    assert!(output.code.contains("pub fn helper_00100010("));
}

#[test]
fn test_symbols_can_be_ignored() {
    let object = ObjectFile::parse(&elf(), "game.elf", 0).unwrap();
    let config = RecompilerConfig {
        use_symbols: false,
        ..RecompilerConfig::default()
    };
    let output = RecompilationPipeline::run(&object, &config).unwrap();
    // helper is still found through the call
    let names: Vec<&str> = output.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["func_00100000", "func_00100010"]);
}

#[test]
fn test_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&words_to_bytes(&program())).unwrap();
    let object = ObjectFile::load(file.path(), 0x0020_0000).unwrap();
    assert_eq!(object.entry_point, 0x0020_0000);
    assert_eq!(object.sections[0].end_address(), 0x0020_001C);
    assert!(object.symbols.is_empty());
}

#[test]
fn test_missing_file() {
    assert!(ObjectFile::load(std::path::Path::new("/nonexistent/game.elf"), 0).is_err());
}
