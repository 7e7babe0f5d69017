//! Emotion Engine static recompiler.
//!
//! `recompiler` turns R5900 machine code into Rust source; `runtime` is the
//! CPU/memory model that the generated code (and the reference interpreter)
//! operates on.

pub mod recompiler;
pub mod runtime;
