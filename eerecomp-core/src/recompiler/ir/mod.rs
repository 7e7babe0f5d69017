//! Intermediate Representation
//!
//! Instructions are lowered to [`Operation`] lists ([`builder`]), which are
//! then either rendered as Rust ([`to_rust`]) or evaluated directly
//! ([`interpreter`]).

pub mod builder;
pub mod instruction;
pub mod interpreter;
pub mod to_rust;

pub use builder::{translate, translate_block, translate_control_transfer, translate_simple};
pub use instruction::{Operation, Translation};
pub use interpreter::Interpreter;
pub use to_rust::RustRenderer;
