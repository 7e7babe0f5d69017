//! Runtime Errors
//!
//! Faults raised by recompiled code. These abort the *emulated* program and are
//! surfaced to whoever called the recompiled function; they never affect the
//! recompiler itself.

use std::fmt;
use thiserror::Error;

/// Width of a memory access, used in fault diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessWidth {
    Byte = 1,
    Half = 2,
    Word = 4,
    Double = 8,
    Quad = 16,
}

impl AccessWidth {
    #[inline]
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessWidth::Byte => "byte",
            AccessWidth::Half => "halfword",
            AccessWidth::Word => "word",
            AccessWidth::Double => "doubleword",
            AccessWidth::Quad => "quadword",
        };
        write!(f, "{} ({} bytes)", name, self.bytes())
    }
}

/// Fatal condition raised while executing recompiled code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Access outside emulated RAM.
    #[error("Memory access out of bounds: {width} at 0x{address:08X} (valid range 0x00000000-0x{last:08X})", last = .size.saturating_sub(1))]
    OutOfBounds {
        address: u32,
        width: AccessWidth,
        size: u32,
    },

    /// Misaligned halfword/word/doubleword access. The hardware raises an
    /// address error here, so recompiled code does too.
    #[error("Unaligned memory access: {width} at 0x{address:08X} (address must be a multiple of {align})", align = .width.bytes())]
    UnalignedAccess { address: u32, width: AccessWidth },

    /// `add`/`sub`/`addi`/`dadd`/`dsub`/`daddi` signed overflow.
    #[error("Integer overflow exception at pc 0x{pc:08X}")]
    IntegerOverflow { pc: u32 },

    /// A conditional trap instruction fired.
    #[error("Trap exception at pc 0x{pc:08X}")]
    Trap { pc: u32 },

    /// `break` instruction.
    #[error("Breakpoint at pc 0x{pc:08X} (code 0x{code:05X})")]
    Break { pc: u32, code: u32 },

    /// `syscall` executed with no handler installed in the context.
    #[error("Unhandled syscall at pc 0x{pc:08X} (v1 = {code})")]
    UnhandledSyscall { pc: u32, code: u64 },

    /// The dispatcher was asked to run an address no recompiled function owns.
    #[error("No recompiled function at 0x{address:08X}")]
    UnknownFunction { address: u32 },

    /// The dispatcher gave up after too many function transitions.
    #[error("Execution did not finish within {limit} dispatch steps")]
    StepLimit { limit: usize },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
