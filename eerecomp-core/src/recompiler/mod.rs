pub mod error;
pub mod config;
pub mod parser;
pub mod decoder;
pub mod analysis;
pub mod ir;
pub mod codegen;
pub mod pipeline;
