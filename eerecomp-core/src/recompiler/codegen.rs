//! Rust Code Generator
//!
//! Emits one Rust function per analyzed [`Function`] plus the address lookup
//! table used by the dispatch trampoline.
//!
//! Every generated function has the same shape:
//!
//! ```text
//! pub fn func_00100000(ctx: &mut CpuContext, memory: &mut MemoryManager) -> RuntimeResult<()> {
//!     loop {
//!         match ctx.pc {
//!             0x00100000 => { /* block */ }
//!             0x00100010 => { /* block */ }
//!             _ => return Ok(()),
//!         }
//!     }
//! }
//! ```
//!
//! Blocks end by assigning `ctx.pc` and continuing the loop. Any `pc` outside
//! the function's blocks (calls, returns, tail jumps) returns to the
//! trampoline, which looks up the next function with `lookup`.

use crate::recompiler::analysis::{BasicBlock, Function};
use crate::recompiler::decoder::Opcode;
use crate::recompiler::error::RecompilerError;
use crate::recompiler::ir::builder::translate_block;
use crate::recompiler::ir::to_rust::RustRenderer;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Rust code generator.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    emit_comments: bool,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            emit_comments: true,
        }
    }

    /// Annotate generated statements with `// 0xADDR: disassembly`.
    pub fn with_comments(mut self, emit_comments: bool) -> Self {
        self.emit_comments = emit_comments;
        self
    }

    /// Rust identifier for a function.
    ///
    /// Generated names (`func_XXXXXXXX`) are used as is; symbol names are
    /// sanitized and suffixed with the entry address so they stay unique.
    pub fn function_identifier(function: &Function) -> String {
        let mut sanitized: String = sanitize_identifier(&function.name);
        if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
            sanitized.insert_str(0, "func_");
        }
        let suffix: String = format!("{:08X}", function.base_address);
        if sanitized.ends_with(&suffix) {
            sanitized
        } else if sanitized.is_empty() {
            format!("func_{}", suffix)
        } else {
            format!("{}_{}", sanitized, suffix)
        }
    }

    /// Module preamble: lint allowances and runtime imports.
    pub fn generate_header(&self, source: &str) -> String {
        let mut code: String = String::with_capacity(512);
        code.push_str("//! Recompiled Emotion Engine code.\n");
        code.push_str(&format!("//! Generated by eerecomp from `{}`. Do not edit.\n\n", source));
        code.push_str(
            "#![allow(non_snake_case, unused_variables, unused_mut, unused_parens, unreachable_code, clippy::all)]\n\n",
        );
        code.push_str(&Self::generate_imports());
        code
    }

    /// Runtime imports the generated functions and lookup table rely on.
    pub fn generate_imports() -> String {
        let mut code: String = String::with_capacity(128);
        code.push_str("use eerecomp_core::runtime::ops;\n");
        code.push_str(
            "use eerecomp_core::runtime::{CpuContext, MemoryManager, RecompiledFn, RuntimeResult};\n\n",
        );
        code
    }

    /// Generate the Rust function for `function`.
    pub fn generate_function(&self, function: &Function) -> Result<String, RecompilerError> {
        let estimated_capacity: usize = function.instruction_count() * 96 + 256;
        let mut code: String = String::with_capacity(estimated_capacity);
        let identifier: String = Self::function_identifier(function);

        writeln!(
            code,
            "/// `{}` (0x{:08X}..0x{:08X}, {} blocks)",
            function.name,
            function.base_address,
            function.end_address(),
            function.blocks.len()
        )?;
        writeln!(
            code,
            "pub fn {}(ctx: &mut CpuContext, memory: &mut MemoryManager) -> RuntimeResult<()> {{",
            identifier
        )?;
        code.push_str("    loop {\n");
        code.push_str("        match ctx.pc {\n");
        for block in function.blocks.iter() {
            self.generate_block(function, block, &mut code)
                .map_err(|e| RecompilerError::codegen(e.to_string(), block.start_address))?;
        }
        code.push_str("            _ => return Ok(()),\n");
        code.push_str("        }\n");
        code.push_str("    }\n");
        code.push_str("}\n\n");
        Ok(code)
    }

    fn generate_block(
        &self,
        function: &Function,
        block: &BasicBlock,
        code: &mut String,
    ) -> std::fmt::Result {
        const BODY_INDENT: usize = 4;
        let pad: &str = "                ";

        writeln!(code, "            0x{:08X} => {{", block.start_address)?;
        let translations = translate_block(function, block);
        let mut terminated: bool = false;
        for (instr, translation) in translations.iter() {
            if self.emit_comments {
                writeln!(code, "{}// 0x{:08X}: {}", pad, instr.address, instr)?;
                if translation.consumed == 2 {
                    if let Some(slot) = function.instruction_at(instr.address.wrapping_add(4)) {
                        writeln!(code, "{}// 0x{:08X}:   {}", pad, slot.address, slot)?;
                    }
                }
            }
            if instr.opcode() == Opcode::Unknown {
                log::debug!(
                    "Placeholder for 0x{:08X} at 0x{:08X} in {}",
                    instr.raw,
                    instr.address,
                    function.name
                );
            }
            RustRenderer::render(&translation.operations, BODY_INDENT, code)?;
            terminated = translation.ends_block();
        }
        if !terminated {
            // fall through into the next block
            writeln!(code, "{}ctx.pc = 0x{:08X};", pad, block.end_address)?;
            writeln!(code, "{}continue;", pad)?;
        }
        code.push_str("            }\n");
        Ok(())
    }

    /// The `lookup` table and `FUNCTION_COUNT`.
    ///
    /// Every block start maps to its function, so returns into the middle of
    /// a function (the instruction after a call) dispatch correctly.
    pub fn generate_lookup(functions: &[Function]) -> Result<String, RecompilerError> {
        let mut owners: BTreeMap<u32, usize> = BTreeMap::new();
        for (index, function) in functions.iter().enumerate() {
            for block in function.blocks.iter() {
                owners.entry(block.start_address).or_insert(index);
            }
        }

        let mut by_function: Vec<Vec<u32>> = vec![Vec::new(); functions.len()];
        for (&address, &index) in owners.iter() {
            by_function[index].push(address);
        }

        let mut code: String = String::with_capacity(64 + owners.len() * 16);
        code.push_str("/// Recompiled function owning the block that starts at `address`.\n");
        code.push_str("pub fn lookup(address: u32) -> Option<RecompiledFn> {\n");
        code.push_str("    match address {\n");
        for (function, addresses) in functions.iter().zip(by_function.iter()) {
            if addresses.is_empty() {
                continue;
            }
            let pattern: Vec<String> = addresses.iter().map(|a| format!("0x{:08X}", a)).collect();
            writeln!(
                code,
                "        {} => Some({} as RecompiledFn),",
                pattern.join(" | "),
                Self::function_identifier(function)
            )?;
        }
        code.push_str("        _ => None,\n");
        code.push_str("    }\n");
        code.push_str("}\n\n");
        writeln!(code, "pub const FUNCTION_COUNT: usize = {};", functions.len())?;
        Ok(code)
    }

    /// Header, every function in order, then the lookup table.
    pub fn generate_module(
        &self,
        functions: &[Function],
        source: &str,
    ) -> Result<String, RecompilerError> {
        let mut code: String = self.generate_header(source);
        for function in functions.iter() {
            code.push_str(&self.generate_function(function)?);
        }
        code.push_str(&Self::generate_lookup(functions)?);
        Ok(code)
    }
}

fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
