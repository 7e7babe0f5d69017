//! Analysis Module
//!
//! Control-flow recovery for a single function and function discovery across
//! a whole code section.

pub mod control_flow;
pub mod functions;

pub use control_flow::{BasicBlock, DecodedSection, Function};
pub use functions::FunctionDiscovery;
