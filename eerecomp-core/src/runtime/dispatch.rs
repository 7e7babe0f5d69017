//! Dispatch Trampoline
//!
//! Recompiled functions return to the caller whenever control leaves their
//! blocks (calls, returns, tail jumps). The trampoline then looks up the
//! function owning the new `pc` and runs it, so the host stack never grows
//! with emulated call depth.

use crate::runtime::context::CpuContext;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::memory::MemoryManager;

/// Signature of every recompiled function.
pub type RecompiledFn = fn(&mut CpuContext, &mut MemoryManager) -> RuntimeResult<()>;

/// Address → function table generated alongside the recompiled code.
pub type LookupFn = fn(u32) -> Option<RecompiledFn>;

/// Default bound on function dispatches before giving up.
pub const DEFAULT_STEP_LIMIT: usize = 10_000_000;

/// Run recompiled code starting at `ctx.pc` until it jumps to `exit_address`.
///
/// Returns the number of function dispatches performed.
pub fn run(
    ctx: &mut CpuContext,
    memory: &mut MemoryManager,
    lookup: LookupFn,
    exit_address: u32,
    step_limit: usize,
) -> RuntimeResult<usize> {
    let mut steps: usize = 0;
    while ctx.pc != exit_address {
        if steps >= step_limit {
            return Err(RuntimeError::StepLimit { limit: step_limit });
        }
        let function: RecompiledFn =
            lookup(ctx.pc).ok_or(RuntimeError::UnknownFunction { address: ctx.pc })?;
        function(ctx, memory)?;
        steps += 1;
    }
    Ok(steps)
}

/// Convenience wrapper around [`run`] that sets up the call frame.
///
/// `call` points `$ra` at the exit address the way a `jal` from the host
/// would, so a function that returns normally ends the run.
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    lookup: LookupFn,
    exit_address: u32,
    step_limit: usize,
}

impl Runner {
    /// Exit address used when none is configured. Never a valid code address
    /// since it is not word aligned.
    pub const DEFAULT_EXIT: u32 = 0xFFFF_FFFE;

    pub fn new(lookup: LookupFn) -> Self {
        Self {
            lookup,
            exit_address: Self::DEFAULT_EXIT,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_exit_address(mut self, exit_address: u32) -> Self {
        self.exit_address = exit_address;
        self
    }

    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn exit_address(&self) -> u32 {
        self.exit_address
    }

    /// Call the function at `entry` and run until it returns to the exit address.
    pub fn call(
        &self,
        ctx: &mut CpuContext,
        memory: &mut MemoryManager,
        entry: u32,
    ) -> RuntimeResult<usize> {
        log::debug!("Dispatching call to 0x{:08X}", entry);
        ctx.set_gpr_u64(
            crate::runtime::context::reg::RA,
            self.exit_address as i32 as i64 as u64,
        );
        ctx.pc = entry;
        run(ctx, memory, self.lookup, self.exit_address, self.step_limit)
    }
}
