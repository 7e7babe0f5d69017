// Build script: recompiles a small sample program so the integration tests
// can run generated code next to the interpreter.
use anyhow::{Context, Result};
use eerecomp_core::recompiler::{
    codegen::CodeGenerator, config::RecompilerConfig, parser::ObjectFile,
    pipeline::RecompilationPipeline,
};
use std::fmt::Write as _;
use std::path::PathBuf;

const SAMPLE_BASE: u32 = 0x0010_0000;

// caller: a0 = 10, call sum; callee: v0 = sum(1..=a0), then div, beql, bnel
const SAMPLE_PROGRAM: [u32; 24] = [
    0x27BD_FFF0, // addiu $sp, $sp, -16
    0xAFBF_000C, // sw    $ra, 12($sp)
    0x2404_000A, // addiu $a0, $zero, 10
    0x0C04_0009, // jal   0x00100024
    0x0000_0000, // nop
    0xAFA2_0004, // sw    $v0, 4($sp)
    0x8FBF_000C, // lw    $ra, 12($sp)
    0x03E0_0008, // jr    $ra
    0x27BD_0010, // addiu $sp, $sp, 16
    0x0000_1021, // 0x00100024: addu  $v0, $zero, $zero
    0x0044_1021, // addu  $v0, $v0, $a0
    0x2484_FFFF, // addiu $a0, $a0, -1
    0x1480_FFFD, // bne   $a0, $zero, 0x00100028
    0x0000_0000, // nop
    0x2408_0003, // addiu $t0, $zero, 3
    0x0048_001A, // div   $v0, $t0
    0x0000_1812, // mflo  $v1
    0x0000_4810, // mfhi  $t1
    0x5120_0003, // beql  $t1, $zero, 0x00100058
    0x2463_0064, // addiu $v1, $v1, 100
    0x5520_0001, // bnel  $t1, $zero, 0x00100058
    0x2463_03E8, // addiu $v1, $v1, 1000
    0x03E0_0008, // jr    $ra
    0xAFA3_0000, // sw    $v1, 0($sp)
];

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");

    let bytes: Vec<u8> = SAMPLE_PROGRAM.iter().flat_map(|w| w.to_le_bytes()).collect();
    let object: ObjectFile = ObjectFile::from_raw(&bytes, "sample.bin", SAMPLE_BASE)?;
    let config: RecompilerConfig = RecompilerConfig {
        base_address: SAMPLE_BASE,
        ..RecompilerConfig::default()
    };
    let sections = RecompilationPipeline::decode_sections(&object, &config)?;
    let functions = RecompilationPipeline::discover_functions(&object, &config, &sections);

    let generator: CodeGenerator = CodeGenerator::new();
    let mut code: String = CodeGenerator::generate_imports();
    writeln!(code, "pub const SAMPLE_BASE: u32 = 0x{:08X};", SAMPLE_BASE)?;
    writeln!(code, "pub const SAMPLE_PROGRAM: [u32; {}] = {:?};\n", SAMPLE_PROGRAM.len(), SAMPLE_PROGRAM)?;
    for function in functions.iter() {
        code.push_str(&generator.generate_function(function)?);
    }
    code.push_str(&CodeGenerator::generate_lookup(&functions)?);

    let out_dir: PathBuf = PathBuf::from(std::env::var("OUT_DIR").context("OUT_DIR is not set")?);
    let path: PathBuf = out_dir.join("sample_program.rs");
    std::fs::write(&path, code).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
