//! Test Utilities
//!
//! Instruction encoders, a minimal ELF32 writer and an interpreter-backed
//! trampoline for running small hand-assembled programs.
#![allow(dead_code)]

use eerecomp_core::recompiler::analysis::{DecodedSection, Function};
use eerecomp_core::recompiler::config::{Endianness, RecompilerConfig};
use eerecomp_core::recompiler::ir::Interpreter;
use eerecomp_core::recompiler::parser::ObjectFile;
use eerecomp_core::recompiler::pipeline::RecompilationPipeline;
use eerecomp_core::runtime::context::reg;
use eerecomp_core::runtime::{CpuContext, MemoryManager, RuntimeError, RuntimeResult};

pub const BASE: u32 = 0x0010_0000;
pub const EXIT: u32 = 0xFFFF_FFFE;

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

pub fn r_type(rs: u8, rt: u8, rd: u8, sa: u8, funct: u32) -> u32 {
    ((rs as u32) << 21) | ((rt as u32) << 16) | ((rd as u32) << 11) | ((sa as u32) << 6) | funct
}

pub fn i_type(op: u32, rs: u8, rt: u8, imm: i16) -> u32 {
    (op << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | (imm as u16 as u32)
}

pub fn nop() -> u32 {
    0
}

pub fn addu(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x21)
}

pub fn add(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x20)
}

pub fn subu(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x23)
}

pub fn slt(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x2A)
}

pub fn sll(rd: u8, rt: u8, sa: u8) -> u32 {
    r_type(0, rt, rd, sa, 0x00)
}

pub fn div(rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, 0, 0, 0x1A)
}

pub fn mflo(rd: u8) -> u32 {
    r_type(0, 0, rd, 0, 0x12)
}

pub fn mfhi(rd: u8) -> u32 {
    r_type(0, 0, rd, 0, 0x10)
}

pub fn addiu(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x09, rs, rt, imm)
}

pub fn addi(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x08, rs, rt, imm)
}

pub fn ori(rt: u8, rs: u8, imm: u16) -> u32 {
    i_type(0x0D, rs, rt, imm as i16)
}

pub fn lui(rt: u8, imm: u16) -> u32 {
    i_type(0x0F, 0, rt, imm as i16)
}

pub fn lw(rt: u8, offset: i16, base: u8) -> u32 {
    i_type(0x23, base, rt, offset)
}

pub fn sw(rt: u8, offset: i16, base: u8) -> u32 {
    i_type(0x2B, base, rt, offset)
}

pub fn sd(rt: u8, offset: i16, base: u8) -> u32 {
    i_type(0x3F, base, rt, offset)
}

pub fn ld(rt: u8, offset: i16, base: u8) -> u32 {
    i_type(0x37, base, rt, offset)
}

/// Branch offsets are in instructions, relative to the delay slot.
pub fn beq(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x04, rs, rt, offset)
}

pub fn bne(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x05, rs, rt, offset)
}

pub fn beql(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x14, rs, rt, offset)
}

pub fn bnel(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x15, rs, rt, offset)
}

pub fn bgtz(rs: u8, offset: i16) -> u32 {
    i_type(0x07, rs, 0, offset)
}

pub fn j(target: u32) -> u32 {
    (0x02 << 26) | ((target >> 2) & 0x03FF_FFFF)
}

pub fn jal(target: u32) -> u32 {
    (0x03 << 26) | ((target >> 2) & 0x03FF_FFFF)
}

pub fn jr(rs: u8) -> u32 {
    r_type(rs, 0, 0, 0, 0x08)
}

pub fn jalr(rd: u8, rs: u8) -> u32 {
    r_type(rs, 0, rd, 0, 0x09)
}

pub fn syscall() -> u32 {
    0x0000_000C
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn section(words: &[u32], base: u32) -> DecodedSection {
    DecodedSection::new(".text", &words_to_bytes(words), base, Endianness::Little)
}

// ---------------------------------------------------------------------------
// ELF32 writer
// ---------------------------------------------------------------------------

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[allow(clippy::too_many_arguments)]
fn section_header(
    out: &mut Vec<u8>,
    name: u32,
    kind: u32,
    flags: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
    entsize: u32,
) {
    push_u32(out, name);
    push_u32(out, kind);
    push_u32(out, flags);
    push_u32(out, addr);
    push_u32(out, offset);
    push_u32(out, size);
    push_u32(out, link);
    push_u32(out, 0); // info
    push_u32(out, 4); // addralign
    push_u32(out, entsize);
}

/// Little-endian MIPS ELF32 executable with one `.text` section at `base`
/// and `STT_FUNC` symbols `(name, address, size)`.
pub fn build_elf(text: &[u32], base: u32, entry: u32, symbols: &[(&str, u32, u32)]) -> Vec<u8> {
    const EHDR_SIZE: u32 = 52;
    const SHDR_SIZE: u32 = 40;
    const SHT_PROGBITS: u32 = 1;
    const SHT_SYMTAB: u32 = 2;
    const SHT_STRTAB: u32 = 3;
    const SHF_ALLOC: u32 = 2;
    const SHF_EXECINSTR: u32 = 4;

    let text_bytes: Vec<u8> = words_to_bytes(text);

    // .strtab
    let mut strtab: Vec<u8> = vec![0];
    let mut symtab: Vec<u8> = vec![0u8; 16]; // null symbol
    for (name, address, size) in symbols.iter() {
        let name_offset: u32 = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
        push_u32(&mut symtab, name_offset);
        push_u32(&mut symtab, *address);
        push_u32(&mut symtab, *size);
        symtab.push(0x12); // STB_GLOBAL | STT_FUNC
        symtab.push(0);
        push_u16(&mut symtab, 1); // .text
    }

    // .shstrtab
    let names: [&str; 4] = [".text", ".symtab", ".strtab", ".shstrtab"];
    let mut shstrtab: Vec<u8> = vec![0];
    let mut name_offsets: Vec<u32> = Vec::new();
    for name in names.iter() {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(name.as_bytes());
        shstrtab.push(0);
    }

    let text_offset: u32 = EHDR_SIZE;
    let symtab_offset: u32 = text_offset + text_bytes.len() as u32;
    let strtab_offset: u32 = symtab_offset + symtab.len() as u32;
    let shstrtab_offset: u32 = strtab_offset + strtab.len() as u32;
    let mut shoff: u32 = shstrtab_offset + shstrtab.len() as u32;
    shoff = (shoff + 3) & !3;

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    push_u16(&mut out, 2); // ET_EXEC
    push_u16(&mut out, 8); // EM_MIPS
    push_u32(&mut out, 1);
    push_u32(&mut out, entry);
    push_u32(&mut out, 0); // phoff
    push_u32(&mut out, shoff);
    push_u32(&mut out, 0); // flags
    push_u16(&mut out, EHDR_SIZE as u16);
    push_u16(&mut out, 32); // phentsize
    push_u16(&mut out, 0); // phnum
    push_u16(&mut out, SHDR_SIZE as u16);
    push_u16(&mut out, 5); // shnum
    push_u16(&mut out, 4); // shstrndx

    out.extend_from_slice(&text_bytes);
    out.extend_from_slice(&symtab);
    out.extend_from_slice(&strtab);
    out.extend_from_slice(&shstrtab);
    out.resize(shoff as usize, 0);

    section_header(&mut out, 0, 0, 0, 0, 0, 0, 0, 0);
    section_header(
        &mut out,
        name_offsets[0],
        SHT_PROGBITS,
        SHF_ALLOC | SHF_EXECINSTR,
        base,
        text_offset,
        text_bytes.len() as u32,
        0,
        0,
    );
    section_header(
        &mut out,
        name_offsets[1],
        SHT_SYMTAB,
        0,
        0,
        symtab_offset,
        symtab.len() as u32,
        3,
        16,
    );
    section_header(
        &mut out,
        name_offsets[2],
        SHT_STRTAB,
        0,
        0,
        strtab_offset,
        strtab.len() as u32,
        0,
        0,
    );
    section_header(
        &mut out,
        name_offsets[3],
        SHT_STRTAB,
        0,
        0,
        shstrtab_offset,
        shstrtab.len() as u32,
        0,
        0,
    );
    out
}

// ---------------------------------------------------------------------------
// Running programs
// ---------------------------------------------------------------------------

/// Analyze `words` loaded at [`BASE`] the way the pipeline does.
pub fn analyze_program(words: &[u32]) -> Vec<Function> {
    let object = ObjectFile::from_raw(&words_to_bytes(words), "test.bin", BASE)
        .expect("raw object");
    let config = RecompilerConfig::default();
    let sections = RecompilationPipeline::decode_sections(&object, &config).expect("sections");
    RecompilationPipeline::discover_functions(&object, &config, &sections)
}

/// Trampoline over the interpreter: the same dispatch protocol as
/// `runtime::dispatch::run`, with functions looked up by block start.
pub fn run_functions(
    functions: &[Function],
    ctx: &mut CpuContext,
    memory: &mut MemoryManager,
    entry: u32,
) -> RuntimeResult<usize> {
    ctx.set_gpr_u64(reg::RA, EXIT as i32 as i64 as u64);
    ctx.pc = entry;
    let mut steps: usize = 0;
    while ctx.pc != EXIT {
        if steps >= 10_000 {
            return Err(RuntimeError::StepLimit { limit: 10_000 });
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

/// Analyze and run `words` from [`BASE`] with 2 MiB of RAM and `$sp` near the top.
pub fn run_program(words: &[u32], ctx: &mut CpuContext) -> RuntimeResult<MemoryManager> {
    let functions: Vec<Function> = analyze_program(words);
    let mut memory: MemoryManager = MemoryManager::with_size(0x0020_0000);
    memory.load_section(BASE, &words_to_bytes(words))?;
    ctx.set_gpr_u64(reg::SP, 0x001F_FF00);
    run_functions(&functions, ctx, &mut memory, BASE)?;
    Ok(memory)
}
