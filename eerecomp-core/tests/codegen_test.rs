//! Generated module tests

mod utils;

use eerecomp_core::recompiler::codegen::CodeGenerator;
use eerecomp_core::runtime::context::reg;
use utils::*;

fn call_program() -> Vec<u32> {
    vec![
        addiu(reg::SP, reg::SP, -16),
        sw(reg::RA, 12, reg::SP),
        jal(BASE + 0x20),
        nop(),
        lw(reg::RA, 12, reg::SP),
        addiu(reg::SP, reg::SP, 16),
        jr(reg::RA),
        nop(),
        // BASE + 0x20
        addiu(reg::V0, reg::ZERO, 7),
        jr(reg::RA),
        nop(),
    ]
}

#[test]
fn test_module_layout() {
    let functions = analyze_program(&call_program());
    let code = CodeGenerator::new()
        .generate_module(&functions, "test.bin")
        .unwrap();

    assert!(code.starts_with("//! Recompiled Emotion Engine code."));
    assert!(code.contains("#![allow(non_snake_case,"));
    assert!(code.contains("use eerecomp_core::runtime::ops;"));
    let caller = code.find("pub fn func_00100000(").unwrap();
    let callee = code.find("pub fn func_00100020(").unwrap();
    let lookup = code.find("pub fn lookup(address: u32)").unwrap();
    assert!(caller < callee && callee < lookup);
    assert!(code.trim_end().ends_with("pub const FUNCTION_COUNT: usize = 2;"));
}

#[test]
fn test_lookup_includes_return_site() {
    let functions = analyze_program(&call_program());
    let lookup = CodeGenerator::generate_lookup(&functions).unwrap();
    assert!(lookup.contains("0x00100000 | 0x00100010 => Some(func_00100000 as RecompiledFn),"));
    assert!(lookup.contains("0x00100020 => Some(func_00100020 as RecompiledFn),"));
    assert!(lookup.contains("_ => None,"));
}

#[test]
fn test_call_sets_link_and_leaves_function() {
    let functions = analyze_program(&call_program());
    let code = CodeGenerator::new().generate_function(&functions[0]).unwrap();
    assert!(code.contains("ctx.set_gpr_u64(31, 0x100010u64);"));
    assert!(code.contains("ctx.pc = 0x00100020;"));
    assert!(code.contains("ops::sw(ctx, memory, 31, 29, 12)?;"));
    assert!(code.contains("ops::lw(ctx, memory, 31, 29, 12)?;"));
}

#[test]
fn test_likely_branch_renders_delay_slot_in_taken_arm() {
    let functions = analyze_program(&[
        addiu(reg::T0, reg::ZERO, 3),
        addiu(reg::T0, reg::T0, -1),
        bnel(reg::T0, reg::ZERO, -2),
        addiu(reg::V0, reg::V0, 1),
        jr(reg::RA),
        nop(),
    ]);
    let code = CodeGenerator::new()
        .with_comments(false)
        .generate_function(&functions[0])
        .unwrap();
    let latch = code.find("let branch_taken: bool").unwrap();
    let taken = code.find("if branch_taken {").unwrap();
    let delay = code[taken..].find("ctx.set_gpr_s32(2,").unwrap() + taken;
    let otherwise = code[taken..].find("} else {").unwrap() + taken;
    assert!(latch < taken && delay < otherwise);
}
