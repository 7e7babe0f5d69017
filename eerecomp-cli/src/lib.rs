//! Command handlers for the `eerecomp` binary.

pub mod commands;
