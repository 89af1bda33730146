//! CLI tool to run pipeline (.pipe) files.
//!
//! Usage:
//!   pipe-run <pipeline.pipe> [input.txt] [-o output.txt] [-v]
//!
//! Input defaults to stdin and output to stdout. Log output goes to stderr
//! and is controlled by `RUST_LOG`.

use clap::Parser;
use linepipe::execute_pipeline;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Run a pipeline file against line-oriented input.
#[derive(Parser)]
#[command(name = "pipe-run")]
struct Cli {
    /// Pipeline definition file (.pipe)
    pipeline: PathBuf,

    /// Input file read by a leading CONSOLE stage (default: stdin)
    input: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show paths and item counts on stderr, and log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,linepipe=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_input(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => io::read_to_string(io::stdin()),
    }
}

fn write_output(path: Option<&Path>, output: &str) -> io::Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let mut text = output.to_string();
            if !text.is_empty() {
                text.push('\n');
            }
            fs::write(path, text)
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            if !output.is_empty() {
                writeln!(stdout)?;
            }
            stdout.flush()
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pipeline_text = match fs::read_to_string(&cli.pipeline) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading pipeline file '{}': {e}", cli.pipeline.display());
            process::exit(1);
        }
    };

    let input_text = match read_input(cli.input.as_deref()) {
        Ok(content) => content,
        Err(e) => {
            let name = cli
                .input
                .as_deref()
                .map_or_else(|| "(stdin)".to_string(), |p| p.display().to_string());
            eprintln!("Error reading input '{name}': {e}");
            process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("Pipeline: {}", cli.pipeline.display());
        eprintln!(
            "Input:    {}",
            cli.input
                .as_deref()
                .map_or_else(|| "(stdin)".to_string(), |p| p.display().to_string())
        );
        eprintln!(
            "Output:   {}",
            cli.output
                .as_deref()
                .map_or_else(|| "(stdout)".to_string(), |p| p.display().to_string())
        );
    }

    match execute_pipeline(&input_text, &pipeline_text) {
        Ok((output, count)) => {
            if let Err(e) = write_output(cli.output.as_deref(), &output) {
                eprintln!("Error writing output: {e}");
                process::exit(1);
            }
            if cli.verbose {
                eprintln!("Items:    {count} out");
            }
        }
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            process::exit(1);
        }
    }
}
