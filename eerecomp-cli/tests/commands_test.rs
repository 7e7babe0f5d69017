//! Command handler tests against files on disk

use eerecomp_cli::commands::{analyze, disasm, load_config, recompile, OUTPUT_FILE};
use eerecomp_core::recompiler::config::RecompilerConfig;
use eerecomp_core::recompiler::pipeline::PipelineStats;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// 0x100000: jal 0x100010 ; nop ; jr $ra ; nop
// 0x100010: addiu $v0, $zero, 1 ; jr $ra ; nop
const PROGRAM: [u32; 7] = [
    0x0C04_0004,
    0,
    0x03E0_0008,
    0,
    0x2402_0001,
    0x03E0_0008,
    0,
];

fn write_program(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("program.bin");
    let bytes: Vec<u8> = PROGRAM.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_recompile_writes_module_and_stats() {
    let dir = TempDir::new().unwrap();
    let input = write_program(&dir);
    let output_dir = dir.path().join("out");
    let stats_path = dir.path().join("stats.json");

    let stats = recompile(
        &input,
        &output_dir,
        &RecompilerConfig::default(),
        Some(&stats_path),
    )
    .unwrap();
    assert_eq!(stats.functions, 2);
    assert_eq!(stats.instructions, 7);

    let code = fs::read_to_string(output_dir.join(OUTPUT_FILE)).unwrap();
    assert!(code.contains("pub fn func_00100000("));
    assert!(code.contains("pub fn lookup(address: u32) -> Option<RecompiledFn>"));

    let written: PipelineStats =
        serde_json::from_str(&fs::read_to_string(&stats_path).unwrap()).unwrap();
    assert_eq!(written, stats);
}

#[test]
fn test_recompile_missing_input() {
    let dir = TempDir::new().unwrap();
    let result = recompile(
        &dir.path().join("missing.elf"),
        dir.path(),
        &RecompilerConfig::default(),
        None,
    );
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("missing.elf"));
    assert!(!dir.path().join(OUTPUT_FILE).exists());
}

#[test]
fn test_analyze_lists_functions_and_blocks() {
    let dir = TempDir::new().unwrap();
    let input = write_program(&dir);
    let mut out: Vec<u8> = Vec::new();
    analyze(&input, &RecompilerConfig::default(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Functions: 2"));
    assert!(text.contains("func_00100010 @ 0x00100010"));
    assert!(text.contains("block 0 0x00100000..0x00100008"));
}

#[test]
fn test_disasm_listing() {
    let dir = TempDir::new().unwrap();
    let input = write_program(&dir);
    let mut out: Vec<u8> = Vec::new();
    disasm(&input, &RecompilerConfig::default(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with(".text:\n"));
    assert!(text.contains("00100010: 24020001  addiu $v0, $zero, 1"));
    assert!(text.contains("jr $ra"));
}

#[test]
fn test_config_file_and_base_override() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("eerecomp.toml");
    fs::write(
        &path,
        "base_address = 0x200000\nemit_comments = false\nseed_entries = [0x200010]\n",
    )
    .unwrap();

    let config = load_config(Some(&path), None).unwrap();
    assert_eq!(config.base_address, 0x0020_0000);
    assert!(!config.emit_comments);
    assert_eq!(config.seed_entries, vec![0x0020_0010]);
    // unspecified fields keep their defaults
    assert_eq!(config.function_prefix, "func_");

    let overridden = load_config(Some(&path), Some(0x0030_0000)).unwrap();
    assert_eq!(overridden.base_address, 0x0030_0000);

    assert!(load_config(Some(&dir.path().join("absent.toml")), None).is_err());
}
