//! transform-singer CLI - reshape Singer records between a tap and a target
//!
//! # Main Command
//!
//! ```bash
//! tap-foo | transform-singer --config config.json | target-bar
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! transform-singer check --config config.json   # Report malformed expressions
//! transform-singer expressions                  # Show available expression types
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` (or put it in `.env`) to change the level.

use clap::{Args, Parser, Subcommand};
use singer_transform::{
    expressions_description, run, JsonLinesSink, MappingConfig, Processor, DEFAULT_META_FILE,
};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "transform-singer", version)]
#[command(about = "Transform Singer RECORD messages through a mapping config", long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    /// Mapping config file (JSON with "mappings" and optional "meta")
    #[arg(short, long, required = true)]
    config: Option<PathBuf>,

    /// Local file merged into "meta" when present
    #[arg(long, default_value = DEFAULT_META_FILE)]
    meta_file: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the config and report malformed expressions
    Check(ConfigArgs),

    /// Show available expression types
    Expressions,
}

#[derive(Args)]
struct ConfigArgs {
    /// Mapping config file
    #[arg(short, long)]
    config: PathBuf,

    /// Local file merged into "meta" when present
    #[arg(long, default_value = DEFAULT_META_FILE)]
    meta_file: PathBuf,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    init_logging();

    let cli = Cli::parse();

    let result = match (cli.command, cli.config) {
        (Some(Commands::Expressions), _) => cmd_expressions(),
        (Some(Commands::Check(args)), _) => cmd_check(&args.config, &args.meta_file),
        (None, Some(config)) => cmd_transform(&config, &cli.meta_file),
        (None, None) => unreachable!("clap requires --config without a subcommand"),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// stdout carries messages, so logs must go to stderr.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cmd_transform(config: &Path, meta_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let processor = Processor::new(MappingConfig::load(config, Some(meta_file))?);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(BufWriter::new(stdout.lock()));

    run(&processor, stdin.lock(), &mut sink)?;
    Ok(())
}

fn cmd_check(config: &Path, meta_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = MappingConfig::load(config, Some(meta_file))?;
    let problems = config.check();

    if problems.is_empty() {
        println!("Config OK: {} stream paths", config.mappings.len());
        return Ok(());
    }

    for problem in &problems {
        println!("{}", problem);
    }
    Err(format!("{} malformed expressions", problems.len()).into())
}

fn cmd_expressions() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", expressions_description());
    Ok(())
}
