//! Recompiler Configuration
//!
//! Settings for one recompilation pass. Loaded from a `.json` or `.toml` file
//! (picked by extension, JSON otherwise); every field has a default so a
//! config file only needs to name what it changes.

use crate::recompiler::error::RecompilerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Byte order used to fetch instruction words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// PS2 executables
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Assemble an instruction word from four bytes.
    #[inline]
    pub fn word(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecompilerConfig {
    /// Byte order of the input
    pub endianness: Endianness,
    /// Load address for raw binaries
    pub base_address: u32,
    /// Sections to recompile (empty = every executable section)
    pub sections: Vec<String>,
    /// Extra function entry points
    pub seed_entries: Vec<u32>,
    /// Treat ELF function symbols as entry points
    pub use_symbols: bool,
    /// Annotate generated code with `// 0xADDR: disassembly`
    pub emit_comments: bool,
    /// Render functions on worker threads
    pub parallel: bool,
    /// Prefix for generated function names
    pub function_prefix: String,
}

impl Default for RecompilerConfig {
    fn default() -> Self {
        Self {
            endianness: Endianness::Little,
            base_address: 0x0010_0000,
            sections: vec![".text".to_string()],
            seed_entries: Vec::new(),
            use_symbols: true,
            emit_comments: true,
            parallel: false,
            function_prefix: "func_".to_string(),
        }
    }
}

impl RecompilerConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, RecompilerError> {
        let content: String = std::fs::read_to_string(path)?;
        let config: RecompilerConfig = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::from_str(&content).map_err(|e| RecompilerError::config(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| RecompilerError::config(e.to_string()))?
        };
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save the configuration (format picked by extension like [`load`](Self::load)).
    pub fn save(&self, path: &Path) -> Result<(), RecompilerError> {
        let content: String = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::to_string_pretty(self).map_err(|e| RecompilerError::config(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| RecompilerError::config(e.to_string()))?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Name for a function without a symbol.
    pub fn function_name(&self, address: u32) -> String {
        format!("{}{:08X}", self.function_prefix, address)
    }
}
