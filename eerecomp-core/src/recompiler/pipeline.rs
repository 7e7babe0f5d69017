//! Complete Recompilation Pipeline
//!
//! Orchestrates the recompilation of one object file into one Rust module.
//!
//! # Pipeline Stages
//! 1. **Section selection**: pick the code sections named in the configuration
//! 2. **Instruction decoding**: decode each section word by word
//! 3. **Function discovery**: seed entries (entry point, configured addresses,
//!    symbols, call targets) and recover each function's blocks
//! 4. **Code generation**: render every function, then the lookup table
//!
//! Generation is the only stage that can run in parallel. Every function is
//! rendered into its own buffer and the buffers are joined in discovery order,
//! so the output does not depend on the worker count.

use crate::recompiler::analysis::{DecodedSection, Function, FunctionDiscovery};
use crate::recompiler::codegen::CodeGenerator;
use crate::recompiler::config::{Endianness, RecompilerConfig};
use crate::recompiler::decoder::Opcode;
use crate::recompiler::error::RecompilerError;
use crate::recompiler::parser::{ObjectFile, Section};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Recompilation pipeline orchestrator.
pub struct RecompilationPipeline;

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub sections: usize,
    pub functions: usize,
    pub blocks: usize,
    pub instructions: usize,
    /// Instructions rendered as placeholders
    pub unknown_instructions: usize,
}

impl PipelineStats {
    fn collect(sections: usize, functions: &[Function]) -> Self {
        let mut stats = PipelineStats {
            sections,
            functions: functions.len(),
            ..Default::default()
        };
        for function in functions.iter() {
            stats.blocks += function.blocks.len();
            for block in function.blocks.iter() {
                stats.instructions += block.instructions.len();
                stats.unknown_instructions += block
                    .instructions
                    .iter()
                    .filter(|instr| instr.opcode() == Opcode::Unknown)
                    .count();
            }
        }
        stats
    }
}

/// Everything produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct RecompilationOutput {
    /// Generated Rust module
    pub code: String,
    /// Analyzed functions, in output order
    pub functions: Vec<Function>,
    pub stats: PipelineStats,
}

impl RecompilationPipeline {
    /// Recompile `object` into a Rust module.
    ///
    /// # Errors
    /// Fails when a configured section is missing or code generation fails.
    /// Unknown opcodes and truncated words are not errors.
    #[inline(never)] // Large function - don't inline
    pub fn run(object: &ObjectFile, config: &RecompilerConfig) -> Result<RecompilationOutput> {
        log::info!("Starting recompilation of {}...", object.path);

        let sections: Vec<DecodedSection> = Self::decode_sections(object, config)?;
        let functions: Vec<Function> = Self::discover_functions(object, config, &sections);
        let stats: PipelineStats = PipelineStats::collect(sections.len(), &functions);

        log::info!(
            "Generating code for {} functions ({} blocks, {} instructions)...",
            stats.functions,
            stats.blocks,
            stats.instructions
        );
        if stats.unknown_instructions > 0 {
            log::warn!(
                "{} unknown instruction(s) will be emitted as placeholders",
                stats.unknown_instructions
            );
        }

        let generator: CodeGenerator = CodeGenerator::new().with_comments(config.emit_comments);
        let bodies: Vec<String> = if config.parallel {
            Self::generate_parallel(&generator, &functions)?
        } else {
            functions
                .iter()
                .map(|function| generator.generate_function(function))
                .collect::<Result<Vec<String>, RecompilerError>>()?
        };

        let estimated_capacity: usize = bodies.iter().map(String::len).sum::<usize>() + 4096;
        let mut code: String = String::with_capacity(estimated_capacity);
        code.push_str(&generator.generate_header(&object.path));
        for body in bodies.iter() {
            code.push_str(body);
        }
        code.push_str(&CodeGenerator::generate_lookup(&functions)?);

        log::info!("Recompilation complete: {} bytes of Rust", code.len());
        Ok(RecompilationOutput {
            code,
            functions,
            stats,
        })
    }

    /// Decode the configured code sections.
    pub fn decode_sections(
        object: &ObjectFile,
        config: &RecompilerConfig,
    ) -> Result<Vec<DecodedSection>> {
        let endianness: Endianness = object.endianness.unwrap_or(config.endianness);
        let selected: Vec<&Section> = object
            .code_sections(&config.sections)
            .with_context(|| format!("Selecting code sections of {}", object.path))?;
        log::info!("Decoding {} section(s) ({:?} endian)...", selected.len(), endianness);
        Ok(selected
            .into_iter()
            .map(|section| {
                log::debug!(
                    "Section {} at 0x{:08X} ({} bytes)",
                    section.name,
                    section.address,
                    section.data.len()
                );
                DecodedSection::new(
                    section.name.as_str(),
                    &section.data,
                    section.address,
                    endianness,
                )
            })
            .collect())
    }

    /// Seed and run function discovery on every section. Functions come back
    /// sorted by section, then address.
    pub fn discover_functions(
        object: &ObjectFile,
        config: &RecompilerConfig,
        sections: &[DecodedSection],
    ) -> Vec<Function> {
        log::info!("Discovering functions...");
        let mut functions: Vec<Function> = Vec::new();
        for section in sections.iter() {
            let mut discovery: FunctionDiscovery<'_> = FunctionDiscovery::new(section);
            discovery.add_seed(object.entry_point, None);
            for &address in config.seed_entries.iter() {
                if !discovery.add_seed(address, None) {
                    log::debug!(
                        "Seed 0x{:08X} is outside section {}",
                        address,
                        section.name
                    );
                }
            }
            if config.use_symbols {
                for symbol in object.symbols.iter() {
                    discovery.add_seed(symbol.address, Some(symbol.name.clone()));
                }
            }
            let calls: usize = discovery.add_call_targets();
            log::debug!(
                "{}: {} entries ({} call targets)",
                section.name,
                discovery.entry_count(),
                calls
            );
            functions.extend(discovery.discover(&config.function_prefix));
        }
        functions
    }

    /// Render functions on scoped worker threads pulling from a shared index.
    fn generate_parallel(
        generator: &CodeGenerator,
        functions: &[Function],
    ) -> Result<Vec<String>, RecompilerError> {
        let workers: usize = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(functions.len().max(1));
        log::info!("Rendering on {} worker thread(s)", workers);

        let counter: AtomicUsize = AtomicUsize::new(0);
        let next: &AtomicUsize = &counter;
        let mut rendered: Vec<(usize, Result<String, RecompilerError>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut local: Vec<(usize, Result<String, RecompilerError>)> = Vec::new();
                        loop {
                            let index: usize = next.fetch_add(1, Ordering::Relaxed);
                            let Some(function) = functions.get(index) else {
                                break;
                            };
                            local.push((index, generator.generate_function(function)));
                        }
                        local
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(local) => local,
                    Err(_) => vec![(
                        usize::MAX,
                        Err(RecompilerError::codegen("worker thread panicked", 0)),
                    )],
                })
                .collect()
        });

        rendered.sort_by_key(|(index, _)| *index);
        rendered.into_iter().map(|(_, body)| body).collect()
    }
}
