//! Recompiled sample program (generated by the build script) against the
//! interpreter.

#[allow(
    non_snake_case,
    unused_variables,
    unused_mut,
    unused_parens,
    unreachable_code,
    dead_code,
    clippy::all
)]
mod sample {
    include!(concat!(env!("OUT_DIR"), "/sample_program.rs"));
}

use eerecomp_core::recompiler::analysis::Function;
use eerecomp_core::recompiler::config::RecompilerConfig;
use eerecomp_core::recompiler::ir::Interpreter;
use eerecomp_core::recompiler::parser::ObjectFile;
use eerecomp_core::recompiler::pipeline::RecompilationPipeline;
use eerecomp_core::runtime::context::reg;
use eerecomp_core::runtime::{CpuContext, MemoryManager, RuntimeError, RuntimeResult, Runner};

const STACK_TOP: u32 = 0x0001_FF00;
const STEP_LIMIT: usize = 1_000;

fn sample_bytes() -> Vec<u8> {
    sample::SAMPLE_PROGRAM
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

fn setup() -> (CpuContext, MemoryManager) {
    let mut ctx = CpuContext::new();
    let mut memory = MemoryManager::with_size(0x0020_0000);
    memory
        .load_section(sample::SAMPLE_BASE, &sample_bytes())
        .unwrap();
    ctx.set_gpr_u64(reg::SP, STACK_TOP as u64);
    (ctx, memory)
}

fn sample_functions() -> Vec<Function> {
    let object = ObjectFile::from_raw(&sample_bytes(), "sample.bin", sample::SAMPLE_BASE).unwrap();
    let config = RecompilerConfig {
        base_address: sample::SAMPLE_BASE,
        ..RecompilerConfig::default()
    };
    let sections = RecompilationPipeline::decode_sections(&object, &config).unwrap();
    RecompilationPipeline::discover_functions(&object, &config, &sections)
}

/// Same dispatch protocol as `Runner::call`, with the interpreter standing in
/// for the generated functions.
fn interpret(
    functions: &[Function],
    ctx: &mut CpuContext,
    memory: &mut MemoryManager,
    entry: u32,
) -> RuntimeResult<usize> {
    ctx.set_gpr_u64(reg::RA, Runner::DEFAULT_EXIT as i32 as i64 as u64);
    ctx.pc = entry;
    let mut steps: usize = 0;
    while ctx.pc != Runner::DEFAULT_EXIT {
        if steps >= STEP_LIMIT {
            return Err(RuntimeError::StepLimit { limit: STEP_LIMIT });
        }
        let function = functions
            .iter()
            .find(|f| f.blocks.iter().any(|b| b.start_address == ctx.pc))
            .ok_or(RuntimeError::UnknownFunction { address: ctx.pc })?;
        Interpreter::run_function(function, ctx, memory)?;
        steps += 1;
    }
    Ok(steps)
}

#[test]
fn test_generated_module_runs() {
    let (mut ctx, mut memory) = setup();
    let runner = Runner::new(sample::lookup).with_step_limit(STEP_LIMIT);
    runner
        .call(&mut ctx, &mut memory, sample::SAMPLE_BASE)
        .unwrap();

    assert_eq!(sample::FUNCTION_COUNT, 2);
    assert_eq!(ctx.gpr_u64(reg::V0), 55);
    assert_eq!(ctx.gpr_u64(reg::V1), 1018);
    assert_eq!(ctx.gpr_u64(reg::T1), 1);
    assert_eq!(ctx.gpr_u64(reg::A0), 0);
    assert_eq!(ctx.lo_u64(), 18);
    assert_eq!(ctx.hi_u64(), 1);
    assert_eq!(ctx.gpr_u32(reg::SP), STACK_TOP);
    assert_eq!(memory.read_u32(STACK_TOP - 16).unwrap(), 1018);
    assert_eq!(memory.read_u32(STACK_TOP - 12).unwrap(), 55);
    assert_eq!(memory.read_u32(STACK_TOP - 4).unwrap(), Runner::DEFAULT_EXIT);
}

#[test]
fn test_generated_module_matches_interpreter() {
    let (mut compiled_ctx, mut compiled_memory) = setup();
    let compiled_steps = Runner::new(sample::lookup)
        .with_step_limit(STEP_LIMIT)
        .call(&mut compiled_ctx, &mut compiled_memory, sample::SAMPLE_BASE)
        .unwrap();

    let functions = sample_functions();
    let (mut interpreted_ctx, mut interpreted_memory) = setup();
    let interpreted_steps = interpret(
        &functions,
        &mut interpreted_ctx,
        &mut interpreted_memory,
        sample::SAMPLE_BASE,
    )
    .unwrap();

    assert_eq!(compiled_steps, interpreted_steps);
    assert_eq!(compiled_ctx.gpr, interpreted_ctx.gpr);
    assert_eq!(compiled_ctx.hi, interpreted_ctx.hi);
    assert_eq!(compiled_ctx.lo, interpreted_ctx.lo);
    assert_eq!(compiled_ctx.pc, interpreted_ctx.pc);
    assert_eq!(
        compiled_memory.read_bytes(STACK_TOP - 16, 16).unwrap(),
        interpreted_memory.read_bytes(STACK_TOP - 16, 16).unwrap()
    );
}

#[test]
fn test_lookup_covers_return_site() {
    assert!(sample::lookup(sample::SAMPLE_BASE).is_some());
    assert!(sample::lookup(sample::SAMPLE_BASE + 0x14).is_some());
    assert!(sample::lookup(sample::SAMPLE_BASE + 0x24).is_some());
    assert!(sample::lookup(sample::SAMPLE_BASE + 0x04).is_none());
}
