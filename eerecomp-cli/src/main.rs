// CLI application
use clap::Parser;
use eerecomp_cli::commands::{self, analyze, disasm, load_config, recompile};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "eerecomp")]
#[command(about = "Emotion Engine (R5900) static recompiler")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load address for raw binaries (hex with 0x prefix, or decimal)
    #[arg(long, global = true, value_parser = commands::parse_address)]
    base: Option<u32>,

    /// Recompiler configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print sections, discovered functions and basic blocks
    Analyze {
        /// ELF executable or raw binary
        input: PathBuf,
    },
    /// Print the decoded instruction listing
    Disasm {
        /// ELF executable or raw binary
        input: PathBuf,
    },
    /// Recompile to a Rust module
    Recompile {
        /// ELF executable or raw binary
        input: PathBuf,

        /// Output directory for recompiled.rs
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Write pipeline statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Render functions on worker threads
        #[arg(long)]
        parallel: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level: &str = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.as_deref(), cli.base)?;
    let stdout = std::io::stdout();

    match cli.command {
        Commands::Analyze { input } => {
            analyze(&input, &config, &mut stdout.lock())?;
        }
        Commands::Disasm { input } => {
            disasm(&input, &config, &mut stdout.lock())?;
        }
        Commands::Recompile {
            input,
            output_dir,
            stats,
            parallel,
        } => {
            let mut config = config;
            config.parallel |= parallel;
            let pb = create_progress_bar("Recompiling...");
            let result = recompile(&input, &output_dir, &config, stats.as_deref());
            match result {
                Ok(stats) => pb.finish_with_message(format!(
                    "Recompiled {} functions ({} blocks, {} instructions, {} unknown)",
                    stats.functions, stats.blocks, stats.instructions, stats.unknown_instructions
                )),
                Err(e) => {
                    pb.abandon_with_message("Recompilation failed");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
