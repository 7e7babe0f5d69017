//! CPU Context
//!
//! Emotion Engine register file as seen by recompiled code.
//!
//! GPRs are 128 bits wide. Ordinary integer instructions only look at the low
//! doubleword and leave the upper doubleword untouched, which is why the setters
//! below are split by view (`u64`, `s32`, full `u128`).
//!
//! HI/LO are 128 bits as well: the upper doublewords are HI1/LO1, written by the
//! R5900's second multiply pipeline (`mult1`, `div1`, ...).

use crate::runtime::error::RuntimeResult;
use crate::runtime::memory::MemoryManager;

/// Host callback invoked by the `syscall` instruction.
pub type SyscallFn = fn(&mut CpuContext, &mut MemoryManager) -> RuntimeResult<()>;

/// Conventional register indices.
pub mod reg {
    pub const ZERO: u8 = 0;
    pub const AT: u8 = 1;
    pub const V0: u8 = 2;
    pub const V1: u8 = 3;
    pub const A0: u8 = 4;
    pub const A1: u8 = 5;
    pub const A2: u8 = 6;
    pub const A3: u8 = 7;
    pub const T0: u8 = 8;
    pub const T1: u8 = 9;
    pub const T2: u8 = 10;
    pub const T3: u8 = 11;
    pub const S0: u8 = 16;
    pub const S1: u8 = 17;
    pub const GP: u8 = 28;
    pub const SP: u8 = 29;
    pub const FP: u8 = 30;
    pub const RA: u8 = 31;
}

/// COP0 register indices used by the runtime.
pub mod cop0 {
    pub const BAD_VADDR: u8 = 8;
    pub const COUNT: u8 = 9;
    pub const STATUS: u8 = 12;
    pub const CAUSE: u8 = 13;
    pub const EPC: u8 = 14;
    pub const PRID: u8 = 15;
}

/// `Cause` value for a system call exception (ExcCode 8 in bits 2..6).
pub const CAUSE_SYSCALL: u32 = 8u32 << 2;

/// R5900 processor revision reported through PRId.
const R5900_PRID: u32 = 0x2E20;

#[derive(Debug, Clone)]
pub struct CpuContext {
    /// General-purpose registers r0-r31 (r0 reads as zero; writes are dropped)
    pub gpr: [u128; 32],
    /// HI (low doubleword) and HI1 (high doubleword)
    pub hi: u128,
    /// LO (low doubleword) and LO1 (high doubleword)
    pub lo: u128,
    /// Shift amount register used by `qfsrv`
    pub sa: u32,
    /// Coprocessor 0 (system control) registers
    pub cp0: [u32; 32],
    /// Program counter
    pub pc: u32,
    /// Handler for `syscall`
    pub syscall_handler: Option<SyscallFn>,
}

impl CpuContext {
    pub fn new() -> Self {
        let mut cp0: [u32; 32] = [0u32; 32];
        cp0[cop0::PRID as usize] = R5900_PRID;
        Self {
            gpr: [0u128; 32],
            hi: 0,
            lo: 0,
            sa: 0,
            cp0,
            pc: 0,
            syscall_handler: None,
        }
    }

    /// Create a context with a syscall handler installed.
    pub fn with_syscall_handler(handler: SyscallFn) -> Self {
        let mut ctx = Self::new();
        ctx.syscall_handler = Some(handler);
        ctx
    }

    /// Low doubleword of a GPR.
    #[inline(always)]
    pub fn gpr_u64(&self, reg: u8) -> u64 {
        self.gpr[(reg & 0x1F) as usize] as u64
    }

    /// Low word of a GPR.
    #[inline(always)]
    pub fn gpr_u32(&self, reg: u8) -> u32 {
        self.gpr[(reg & 0x1F) as usize] as u32
    }

    /// Full 128-bit GPR.
    #[inline(always)]
    pub fn gpr_u128(&self, reg: u8) -> u128 {
        self.gpr[(reg & 0x1F) as usize]
    }

    /// Write the low doubleword of a GPR, preserving the upper doubleword.
    #[inline(always)]
    pub fn set_gpr_u64(&mut self, reg: u8, value: u64) {
        if reg == reg::ZERO {
            return;
        }
        let slot: &mut u128 = &mut self.gpr[(reg & 0x1F) as usize];
        *slot = (*slot & !(u64::MAX as u128)) | value as u128;
    }

    /// Write a 32-bit result, sign-extended into the low doubleword.
    #[inline(always)]
    pub fn set_gpr_s32(&mut self, reg: u8, value: u32) {
        self.set_gpr_u64(reg, value as i32 as i64 as u64);
    }

    /// Write the low word of a GPR without sign extension, preserving bits
    /// 32..127. Only the partial unaligned loads need this.
    #[inline(always)]
    pub fn set_gpr_low_u32(&mut self, reg: u8, value: u32) {
        if reg == reg::ZERO {
            return;
        }
        let slot: &mut u128 = &mut self.gpr[(reg & 0x1F) as usize];
        *slot = (*slot & !(u32::MAX as u128)) | value as u128;
    }

    /// Write all 128 bits of a GPR.
    #[inline(always)]
    pub fn set_gpr_u128(&mut self, reg: u8, value: u128) {
        if reg == reg::ZERO {
            return;
        }
        self.gpr[(reg & 0x1F) as usize] = value;
    }

    #[inline]
    pub fn hi_u64(&self) -> u64 {
        self.hi as u64
    }

    #[inline]
    pub fn lo_u64(&self) -> u64 {
        self.lo as u64
    }

    #[inline]
    pub fn hi1_u64(&self) -> u64 {
        (self.hi >> 64) as u64
    }

    #[inline]
    pub fn lo1_u64(&self) -> u64 {
        (self.lo >> 64) as u64
    }

    #[inline]
    pub fn set_hi_u64(&mut self, value: u64) {
        self.hi = (self.hi & !(u64::MAX as u128)) | value as u128;
    }

    #[inline]
    pub fn set_lo_u64(&mut self, value: u64) {
        self.lo = (self.lo & !(u64::MAX as u128)) | value as u128;
    }

    #[inline]
    pub fn set_hi1_u64(&mut self, value: u64) {
        self.hi = (self.hi & u64::MAX as u128) | ((value as u128) << 64);
    }

    #[inline]
    pub fn set_lo1_u64(&mut self, value: u64) {
        self.lo = (self.lo & u64::MAX as u128) | ((value as u128) << 64);
    }

    pub fn cp0(&self, reg: u8) -> u32 {
        self.cp0[(reg & 0x1F) as usize]
    }

    pub fn set_cp0(&mut self, reg: u8, value: u32) {
        self.cp0[(reg & 0x1F) as usize] = value;
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}
