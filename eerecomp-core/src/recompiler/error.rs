//! Recompiler Errors
//!
//! Errors that abort a recompilation pass. Everything the pipeline can recover
//! from (truncated trailing word, unknown opcode, runaway block) is handled
//! locally and logged instead; faults of the *emulated* program live in
//! [`crate::runtime::RuntimeError`].
//!
//! # Error Categories
//! - **Input errors**: unreadable or malformed object files, missing sections
//! - **Range errors**: section bytes that do not fit the address space
//! - **Code generation errors**: rendering failures
//! - **Configuration errors**: invalid or unreadable configuration files

use thiserror::Error;

/// Recompiler error types.
///
/// Every variant carries a `suggestion` pointing the user at the likely fix.
#[derive(Error, Debug, Clone)]
pub enum RecompilerError {
    /// The input could not be parsed as an ELF or raw binary.
    #[error("Object parsing error: {message}\nSuggestion: {suggestion}")]
    ObjectParse { message: String, suggestion: String },

    /// A requested section does not exist or holds no code.
    #[error("Section not found: {name}\nSuggestion: {suggestion}")]
    SectionNotFound { name: String, suggestion: String },

    /// A section or address range is not representable in the 32-bit address space.
    #[error("Invalid address range 0x{start:08X}+0x{len:X}\nSuggestion: {suggestion}")]
    InvalidRange { start: u64, len: u64, suggestion: String },

    /// Rendering generated code failed.
    #[error("Code generation error at 0x{address:08X}: {message}\nSuggestion: {suggestion}")]
    CodeGen {
        message: String,
        address: u32,
        suggestion: String,
    },

    /// Configuration could not be read or is invalid.
    #[error("Configuration error: {message}\nSuggestion: {suggestion}")]
    Config { message: String, suggestion: String },

    /// Filesystem failure while reading input or writing output.
    #[error("IO error: {message}\nSuggestion: {suggestion}")]
    Io { message: String, suggestion: String },
}

impl RecompilerError {
    /// Create an object parse error.
    pub fn object_parse(message: impl Into<String>) -> Self {
        Self::ObjectParse {
            message: message.into(),
            suggestion: "Check that the input is a MIPS ELF or pass --base for a raw binary."
                .to_string(),
        }
    }

    /// Create a missing-section error.
    pub fn section_not_found(name: impl Into<String>) -> Self {
        Self::SectionNotFound {
            name: name.into(),
            suggestion: "Run `eerecomp analyze` to list the sections, then adjust `sections` in the config."
                .to_string(),
        }
    }

    /// Create an invalid-range error.
    pub fn invalid_range(start: u64, len: u64) -> Self {
        let suggestion = if start > u32::MAX as u64 {
            "The section address does not fit in 32 bits. Is this a 64-bit object?"
        } else {
            "The section extends past the end of the address space. Check the base address."
        };
        Self::InvalidRange {
            start,
            len,
            suggestion: suggestion.to_string(),
        }
    }

    /// Create a code generation error.
    pub fn codegen(message: impl Into<String>, address: u32) -> Self {
        Self::CodeGen {
            message: message.into(),
            address,
            suggestion: "This is a recompiler bug. Please report the input that triggers it."
                .to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            suggestion: "Configuration files must be JSON (.json) or TOML (.toml).".to_string(),
        }
    }
}

impl From<std::io::Error> for RecompilerError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        RecompilerError::Io {
            message: err.to_string(),
            suggestion: "Check file permissions and that the file exists.".to_string(),
        }
    }
}

impl From<std::fmt::Error> for RecompilerError {
    #[cold]
    fn from(err: std::fmt::Error) -> Self {
        RecompilerError::codegen(err.to_string(), 0)
    }
}

impl From<goblin::error::Error> for RecompilerError {
    #[cold]
    fn from(err: goblin::error::Error) -> Self {
        RecompilerError::object_parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_suggestions() {
        let err = RecompilerError::section_not_found(".text");
        let text = err.to_string();
        assert!(text.contains(".text"));
        assert!(text.contains("Suggestion:"));
    }

    #[test]
    fn test_invalid_range_suggestion_depends_on_start() {
        let wide = RecompilerError::invalid_range(0x1_0000_0000, 4).to_string();
        assert!(wide.contains("64-bit"));
        let tail = RecompilerError::invalid_range(0xFFFF_FFF0, 0x100).to_string();
        assert!(tail.contains("end of the address space"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RecompilerError = io.into();
        assert!(matches!(err, RecompilerError::Io { .. }));
    }
}
