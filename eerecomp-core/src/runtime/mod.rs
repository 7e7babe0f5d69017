//! Runtime Support
//!
//! Everything recompiled code links against: the Emotion Engine register file,
//! the flat emulated RAM, the per-instruction helpers that are too involved to
//! inline, and the trampoline that runs recompiled functions by address.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod ops;

pub use context::{CpuContext, SyscallFn};
pub use dispatch::{RecompiledFn, Runner};
pub use error::{AccessWidth, RuntimeError, RuntimeResult};
pub use memory::MemoryManager;
