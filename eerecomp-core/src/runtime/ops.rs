//! Instruction Helpers
//!
//! Semantics of the R5900 instructions that are too involved to inline into
//! generated code: trapping arithmetic, memory accesses (including the
//! unaligned left/right family), multiply/divide and exception entry.
//!
//! Recompiled code calls these directly (`ops::lw(ctx, memory, 8, 29, 16)?;`),
//! and the reference interpreter calls the very same functions, so both always
//! agree on behavior.
//!
//! Register arguments are GPR indices. Addresses are computed as
//! `GPR[base].UL[0] + sign_extend(offset)`.

use crate::runtime::context::{cop0, reg, CpuContext, CAUSE_SYSCALL};
use crate::runtime::error::{AccessWidth, RuntimeError, RuntimeResult};
use crate::runtime::memory::MemoryManager;

/// Effective address of a `offset(base)` operand.
#[inline(always)]
pub fn effective_address(ctx: &CpuContext, base: u8, offset: i16) -> u32 {
    ctx.gpr_u32(base).wrapping_add(offset as i32 as u32)
}

#[inline(always)]
fn check_alignment(address: u32, width: AccessWidth) -> RuntimeResult<()> {
    if address & (width.bytes() - 1) != 0 {
        return Err(RuntimeError::UnalignedAccess { address, width });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Overflow-trapping arithmetic
// ---------------------------------------------------------------------------

/// `add rd, rs, rt`: 32-bit add, faults on signed overflow without writing `rd`.
pub fn add(ctx: &mut CpuContext, pc: u32, rd: u8, rs: u8, rt: u8) -> RuntimeResult<()> {
    let rhs: u32 = ctx.gpr_u32(rt);
    add_value(ctx, pc, rd, rs, rhs)
}

/// `addi rt, rs, imm`.
pub fn addi(ctx: &mut CpuContext, pc: u32, rt: u8, rs: u8, imm: i16) -> RuntimeResult<()> {
    add_value(ctx, pc, rt, rs, imm as i32 as u32)
}

fn add_value(ctx: &mut CpuContext, pc: u32, dst: u8, rs: u8, rhs: u32) -> RuntimeResult<()> {
    match (ctx.gpr_u32(rs) as i32).checked_add(rhs as i32) {
        Some(result) => {
            ctx.set_gpr_s32(dst, result as u32);
            Ok(())
        }
        None => Err(RuntimeError::IntegerOverflow { pc }),
    }
}

/// `sub rd, rs, rt`: 32-bit subtract, faults on signed overflow.
pub fn sub(ctx: &mut CpuContext, pc: u32, rd: u8, rs: u8, rt: u8) -> RuntimeResult<()> {
    match (ctx.gpr_u32(rs) as i32).checked_sub(ctx.gpr_u32(rt) as i32) {
        Some(result) => {
            ctx.set_gpr_s32(rd, result as u32);
            Ok(())
        }
        None => Err(RuntimeError::IntegerOverflow { pc }),
    }
}

/// `dadd rd, rs, rt`: 64-bit add, faults on signed overflow.
pub fn dadd(ctx: &mut CpuContext, pc: u32, rd: u8, rs: u8, rt: u8) -> RuntimeResult<()> {
    let rhs: u64 = ctx.gpr_u64(rt);
    dadd_value(ctx, pc, rd, rs, rhs)
}

/// `daddi rt, rs, imm`.
pub fn daddi(ctx: &mut CpuContext, pc: u32, rt: u8, rs: u8, imm: i16) -> RuntimeResult<()> {
    dadd_value(ctx, pc, rt, rs, imm as i64 as u64)
}

fn dadd_value(ctx: &mut CpuContext, pc: u32, dst: u8, rs: u8, rhs: u64) -> RuntimeResult<()> {
    match (ctx.gpr_u64(rs) as i64).checked_add(rhs as i64) {
        Some(result) => {
            ctx.set_gpr_u64(dst, result as u64);
            Ok(())
        }
        None => Err(RuntimeError::IntegerOverflow { pc }),
    }
}

/// `dsub rd, rs, rt`: 64-bit subtract, faults on signed overflow.
pub fn dsub(ctx: &mut CpuContext, pc: u32, rd: u8, rs: u8, rt: u8) -> RuntimeResult<()> {
    match (ctx.gpr_u64(rs) as i64).checked_sub(ctx.gpr_u64(rt) as i64) {
        Some(result) => {
            ctx.set_gpr_u64(rd, result as u64);
            Ok(())
        }
        None => Err(RuntimeError::IntegerOverflow { pc }),
    }
}

// ---------------------------------------------------------------------------
// Aligned loads and stores
// ---------------------------------------------------------------------------

pub fn lb(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let value: u8 = memory.read_u8(address)?;
    ctx.set_gpr_u64(rt, value as i8 as i64 as u64);
    Ok(())
}

pub fn lbu(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let value: u8 = memory.read_u8(address)?;
    ctx.set_gpr_u64(rt, value as u64);
    Ok(())
}

pub fn lh(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Half)?;
    let value: u16 = memory.read_u16(address)?;
    ctx.set_gpr_u64(rt, value as i16 as i64 as u64);
    Ok(())
}

pub fn lhu(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Half)?;
    let value: u16 = memory.read_u16(address)?;
    ctx.set_gpr_u64(rt, value as u64);
    Ok(())
}

pub fn lw(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Word)?;
    let value: u32 = memory.read_u32(address)?;
    ctx.set_gpr_s32(rt, value);
    Ok(())
}

pub fn lwu(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Word)?;
    let value: u32 = memory.read_u32(address)?;
    ctx.set_gpr_u64(rt, value as u64);
    Ok(())
}

pub fn ld(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Double)?;
    let value: u64 = memory.read_u64(address)?;
    ctx.set_gpr_u64(rt, value);
    Ok(())
}

/// `lq`: the low four address bits are ignored.
pub fn lq(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset) & !0xF;
    let value: u128 = memory.read_u128(address)?;
    ctx.set_gpr_u128(rt, value);
    Ok(())
}

pub fn sb(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    memory.write_u8(address, ctx.gpr_u64(rt) as u8)
}

pub fn sh(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Half)?;
    memory.write_u16(address, ctx.gpr_u64(rt) as u16)
}

pub fn sw(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Word)?;
    memory.write_u32(address, ctx.gpr_u32(rt))
}

pub fn sd(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    check_alignment(address, AccessWidth::Double)?;
    memory.write_u64(address, ctx.gpr_u64(rt))
}

/// `sq`: the low four address bits are ignored.
pub fn sq(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset) & !0xF;
    memory.write_u128(address, ctx.gpr_u128(rt))
}

// ---------------------------------------------------------------------------
// Unaligned loads and stores
//
// Little-endian layout: for a byte offset `s` inside the aligned unit, the
// Left variants move the bytes from the start of the unit up to `s` into the
// most-significant end of the register, the Right variants move the bytes from
// `s` to the end of the unit into the least-significant end. `lwr A; lwl A+3`
// (and `ldr A; ldl A+7`) therefore rebuild the unaligned value at `A`.
// ---------------------------------------------------------------------------

/// `lwl`: merge the low-addressed bytes of the aligned word into the top of `rt`.
pub fn lwl(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 3;
    let word: u32 = memory.read_u32(address & !3)?;
    let keep: u32 = 0x00FF_FFFFu32 >> (shift * 8);
    let merged: u32 = (ctx.gpr_u32(rt) & keep) | (word << (24 - shift * 8));
    ctx.set_gpr_s32(rt, merged);
    Ok(())
}

/// `lwr`: merge the high-addressed bytes of the aligned word into the bottom of `rt`.
/// Only a full-word load (`shift == 0`) sign-extends.
pub fn lwr(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 3;
    let word: u32 = memory.read_u32(address & !3)?;
    let keep: u32 = !(u32::MAX >> (shift * 8));
    let merged: u32 = (ctx.gpr_u32(rt) & keep) | (word >> (shift * 8));
    if shift == 0 {
        ctx.set_gpr_s32(rt, merged);
    } else {
        ctx.set_gpr_low_u32(rt, merged);
    }
    Ok(())
}

/// `ldl`: doubleword counterpart of [`lwl`].
pub fn ldl(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 7;
    let double: u64 = memory.read_u64(address & !7)?;
    let keep: u64 = 0x00FF_FFFF_FFFF_FFFFu64 >> (shift * 8);
    let merged: u64 = (ctx.gpr_u64(rt) & keep) | (double << (56 - shift * 8));
    ctx.set_gpr_u64(rt, merged);
    Ok(())
}

/// `ldr`: doubleword counterpart of [`lwr`].
pub fn ldr(ctx: &mut CpuContext, memory: &MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 7;
    let double: u64 = memory.read_u64(address & !7)?;
    let keep: u64 = !(u64::MAX >> (shift * 8));
    let merged: u64 = (ctx.gpr_u64(rt) & keep) | (double >> (shift * 8));
    ctx.set_gpr_u64(rt, merged);
    Ok(())
}

/// `swl`: store the top bytes of `rt` into the low-addressed end of the aligned word.
pub fn swl(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 3;
    let aligned: u32 = address & !3;
    let word: u32 = memory.read_u32(aligned)?;
    let keep: u32 = !(u32::MAX >> (24 - shift * 8));
    let merged: u32 = (ctx.gpr_u32(rt) >> (24 - shift * 8)) | (word & keep);
    memory.write_u32(aligned, merged)
}

/// `swr`: store the bottom bytes of `rt` into the high-addressed end of the aligned word.
pub fn swr(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 3;
    let aligned: u32 = address & !3;
    let word: u32 = memory.read_u32(aligned)?;
    let keep: u32 = if shift == 0 { 0 } else { u32::MAX >> (32 - shift * 8) };
    let merged: u32 = (ctx.gpr_u32(rt) << (shift * 8)) | (word & keep);
    memory.write_u32(aligned, merged)
}

/// `sdl`: doubleword counterpart of [`swl`].
pub fn sdl(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 7;
    let aligned: u32 = address & !7;
    let double: u64 = memory.read_u64(aligned)?;
    let keep: u64 = !(u64::MAX >> (56 - shift * 8));
    let merged: u64 = (ctx.gpr_u64(rt) >> (56 - shift * 8)) | (double & keep);
    memory.write_u64(aligned, merged)
}

/// `sdr`: doubleword counterpart of [`swr`].
pub fn sdr(ctx: &CpuContext, memory: &mut MemoryManager, rt: u8, base: u8, offset: i16) -> RuntimeResult<()> {
    let address: u32 = effective_address(ctx, base, offset);
    let shift: u32 = address & 7;
    let aligned: u32 = address & !7;
    let double: u64 = memory.read_u64(aligned)?;
    let keep: u64 = if shift == 0 { 0 } else { u64::MAX >> (64 - shift * 8) };
    let merged: u64 = (ctx.gpr_u64(rt) << (shift * 8)) | (double & keep);
    memory.write_u64(aligned, merged)
}

// ---------------------------------------------------------------------------
// Multiply / divide
//
// `pipeline` selects HI/LO (0) or HI1/LO1 (1). Results are 32-bit values
// sign-extended into the 64-bit halves. R5900 `mult`/`multu`/`madd` also copy
// LO into `rd`.
// ---------------------------------------------------------------------------

#[inline]
fn write_hi_lo(ctx: &mut CpuContext, pipeline: u8, hi: u32, lo: u32) {
    let hi: u64 = hi as i32 as i64 as u64;
    let lo: u64 = lo as i32 as i64 as u64;
    if pipeline == 0 {
        ctx.set_hi_u64(hi);
        ctx.set_lo_u64(lo);
    } else {
        ctx.set_hi1_u64(hi);
        ctx.set_lo1_u64(lo);
    }
}

#[inline]
fn read_hi_lo(ctx: &CpuContext, pipeline: u8) -> u64 {
    let (hi, lo) = if pipeline == 0 {
        (ctx.hi_u64(), ctx.lo_u64())
    } else {
        (ctx.hi1_u64(), ctx.lo1_u64())
    };
    ((hi as u32 as u64) << 32) | lo as u32 as u64
}

pub fn mult(ctx: &mut CpuContext, pipeline: u8, rd: u8, rs: u8, rt: u8) {
    let product: i64 = (ctx.gpr_u32(rs) as i32 as i64) * (ctx.gpr_u32(rt) as i32 as i64);
    write_hi_lo(ctx, pipeline, (product >> 32) as u32, product as u32);
    ctx.set_gpr_s32(rd, product as u32);
}

pub fn multu(ctx: &mut CpuContext, pipeline: u8, rd: u8, rs: u8, rt: u8) {
    let product: u64 = (ctx.gpr_u32(rs) as u64) * (ctx.gpr_u32(rt) as u64);
    write_hi_lo(ctx, pipeline, (product >> 32) as u32, product as u32);
    ctx.set_gpr_s32(rd, product as u32);
}

/// `madd`: `HI:LO += rs * rt` (signed).
pub fn madd(ctx: &mut CpuContext, pipeline: u8, rd: u8, rs: u8, rt: u8) {
    let product: i64 = (ctx.gpr_u32(rs) as i32 as i64) * (ctx.gpr_u32(rt) as i32 as i64);
    let sum: u64 = read_hi_lo(ctx, pipeline).wrapping_add(product as u64);
    write_hi_lo(ctx, pipeline, (sum >> 32) as u32, sum as u32);
    ctx.set_gpr_s32(rd, sum as u32);
}

/// `maddu`: `HI:LO += rs * rt` (unsigned).
pub fn maddu(ctx: &mut CpuContext, pipeline: u8, rd: u8, rs: u8, rt: u8) {
    let product: u64 = (ctx.gpr_u32(rs) as u64) * (ctx.gpr_u32(rt) as u64);
    let sum: u64 = read_hi_lo(ctx, pipeline).wrapping_add(product);
    write_hi_lo(ctx, pipeline, (sum >> 32) as u32, sum as u32);
    ctx.set_gpr_s32(rd, sum as u32);
}

/// `div`: LO = quotient, HI = remainder. A zero divisor leaves HI/LO untouched.
pub fn div(ctx: &mut CpuContext, pipeline: u8, rs: u8, rt: u8) {
    let numerator: i32 = ctx.gpr_u32(rs) as i32;
    let denominator: i32 = ctx.gpr_u32(rt) as i32;
    if denominator == 0 {
        return;
    }
    // i32::MIN / -1 wraps to i32::MIN with remainder 0, as the hardware does
    let quotient: i32 = numerator.wrapping_div(denominator);
    let remainder: i32 = numerator.wrapping_rem(denominator);
    write_hi_lo(ctx, pipeline, remainder as u32, quotient as u32);
}

/// `divu`: unsigned [`div`]. A zero divisor leaves HI/LO untouched.
pub fn divu(ctx: &mut CpuContext, pipeline: u8, rs: u8, rt: u8) {
    let numerator: u32 = ctx.gpr_u32(rs);
    let denominator: u32 = ctx.gpr_u32(rt);
    if denominator == 0 {
        return;
    }
    write_hi_lo(ctx, pipeline, numerator % denominator, numerator / denominator);
}

// ---------------------------------------------------------------------------
// Coprocessor 0 and exceptions
// ---------------------------------------------------------------------------

/// `mfc0 rt, rd`: COP0 register into GPR, sign-extended.
pub fn mfc0(ctx: &mut CpuContext, rt: u8, rd: u8) {
    let value: u32 = ctx.cp0(rd);
    ctx.set_gpr_s32(rt, value);
}

/// `mtc0 rt, rd`: GPR into COP0 register.
pub fn mtc0(ctx: &mut CpuContext, rt: u8, rd: u8) {
    let value: u32 = ctx.gpr_u32(rt);
    ctx.set_cp0(rd, value);
}

// ---------------------------------------------------------------------------
// Shift amount register
// ---------------------------------------------------------------------------

/// `mtsab rs, imm`: byte shift amount for `qfsrv`, stored in bits.
pub fn mtsab(ctx: &mut CpuContext, rs: u8, imm: i16) {
    ctx.sa = ((ctx.gpr_u32(rs) ^ imm as u32) & 0xF) * 8;
}

/// `mtsah rs, imm`: halfword shift amount for `qfsrv`, stored in bits.
pub fn mtsah(ctx: &mut CpuContext, rs: u8, imm: i16) {
    ctx.sa = ((ctx.gpr_u32(rs) ^ imm as u32) & 0x7) * 16;
}

/// `syscall`: record the return PC and the cause code, then hand off to the
/// host handler installed in the context.
pub fn syscall(ctx: &mut CpuContext, memory: &mut MemoryManager, pc: u32) -> RuntimeResult<()> {
    ctx.set_cp0(cop0::EPC, pc.wrapping_add(4));
    let cause: u32 = (ctx.cp0(cop0::CAUSE) & !0x7C) | CAUSE_SYSCALL;
    ctx.set_cp0(cop0::CAUSE, cause);
    match ctx.syscall_handler {
        Some(handler) => handler(ctx, memory),
        None => Err(RuntimeError::UnhandledSyscall {
            pc,
            code: ctx.gpr_u64(reg::V1),
        }),
    }
}

/// `break code`.
pub fn breakpoint(pc: u32, code: u32) -> RuntimeResult<()> {
    Err(RuntimeError::Break { pc, code })
}

/// Conditional trap (`teq`, `tgei`, ...): faults when `condition` holds.
pub fn trap_if(condition: bool, pc: u32) -> RuntimeResult<()> {
    if condition {
        return Err(RuntimeError::Trap { pc });
    }
    Ok(())
}
