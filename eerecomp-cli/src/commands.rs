// CLI command handlers
use anyhow::{Context, Result};
use eerecomp_core::recompiler::{
    codegen::CodeGenerator,
    config::RecompilerConfig,
    parser::ObjectFile,
    pipeline::{PipelineStats, RecompilationPipeline},
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the generated module inside the output directory.
pub const OUTPUT_FILE: &str = "recompiled.rs";

/// Parse an address given as `0x`-prefixed hex or decimal.
pub fn parse_address(text: &str) -> Result<u32, String> {
    let text: &str = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

/// Load the configuration (or defaults) and apply command-line overrides.
pub fn load_config(config: Option<&Path>, base: Option<u32>) -> Result<RecompilerConfig> {
    let mut loaded: RecompilerConfig = match config {
        Some(path) => RecompilerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => RecompilerConfig::default(),
    };
    if let Some(base) = base {
        loaded.base_address = base;
    }
    Ok(loaded)
}

fn load_object(input: &Path, config: &RecompilerConfig) -> Result<ObjectFile> {
    ObjectFile::load(input, config.base_address)
        .with_context(|| format!("Failed to load input: {}", input.display()))
}

/// Print sections, discovered functions and their blocks.
pub fn analyze(input: &Path, config: &RecompilerConfig, out: &mut dyn Write) -> Result<()> {
    let object: ObjectFile = load_object(input, config)?;

    writeln!(out, "Input: {}", input.display())?;
    writeln!(out, "  Entry point: 0x{:08X}", object.entry_point)?;
    writeln!(out, "  Symbols: {}", object.symbols.len())?;
    writeln!(out, "  Sections:")?;
    for section in object.sections.iter() {
        writeln!(
            out,
            "    {:<16} 0x{:08X}..0x{:08X}{}",
            section.name,
            section.address,
            section.end_address(),
            if section.executable { " (code)" } else { "" }
        )?;
    }

    let sections = RecompilationPipeline::decode_sections(&object, config)?;
    let functions = RecompilationPipeline::discover_functions(&object, config, &sections);
    writeln!(out, "  Functions: {}", functions.len())?;
    for function in functions.iter() {
        writeln!(
            out,
            "    {} @ 0x{:08X} (size: 0x{:X}, {} blocks)",
            function.name,
            function.base_address,
            function.size,
            function.blocks.len()
        )?;
        for block in function.blocks.iter() {
            let successors: Vec<String> = block
                .successors()
                .iter()
                .map(|s| s.to_string())
                .collect();
            writeln!(
                out,
                "      block {} 0x{:08X}..0x{:08X} -> [{}]",
                block.id,
                block.start_address,
                block.end_address,
                successors.join(", ")
            )?;
        }
    }
    Ok(())
}

/// Print the decoded listing of every code section.
pub fn disasm(input: &Path, config: &RecompilerConfig, out: &mut dyn Write) -> Result<()> {
    let object: ObjectFile = load_object(input, config)?;
    let sections = RecompilationPipeline::decode_sections(&object, config)?;
    for section in sections.iter() {
        writeln!(out, "{}:", section.name)?;
        for instr in section.instructions.iter() {
            if let Some(symbol) = object.symbol_at(instr.address) {
                writeln!(out, "{}:", symbol.name)?;
            }
            writeln!(out, "  {:08X}: {:08X}  {}", instr.address, instr.raw, instr)?;
        }
    }
    Ok(())
}

/// Recompile `input` into `<output_dir>/recompiled.rs`.
pub fn recompile(
    input: &Path,
    output_dir: &Path,
    config: &RecompilerConfig,
    stats_path: Option<&Path>,
) -> Result<PipelineStats> {
    let object: ObjectFile = load_object(input, config)?;
    let output = RecompilationPipeline::run(&object, config)
        .with_context(|| format!("Failed to recompile {}", input.display()))?;

    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;
    let output_path: PathBuf = output_dir.join(OUTPUT_FILE);
    fs::write(&output_path, &output.code)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    log::info!("Wrote {}", output_path.display());

    if let Some(path) = stats_path {
        let json: String = serde_json::to_string_pretty(&output.stats)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write stats: {}", path.display()))?;
    }

    for function in output.functions.iter() {
        log::debug!(
            "{} -> {}",
            function.name,
            CodeGenerator::function_identifier(function)
        );
    }
    Ok(output.stats)
}
