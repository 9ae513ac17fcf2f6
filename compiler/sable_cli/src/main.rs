//! Sable compiler command-line interface
//!
//! `sablec` drives the core pipeline over one or more source files,
//! renders diagnostics with their stable codes, and can dump the IL
//! validation report or a JSON view of the diagnostics for tooling.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sable_driver::{compile, CompileOptions, DebugInfo};
use std::path::PathBuf;

mod config;

use config::{parse_opt_level, parse_output_format, ProjectConfig};

/// The Sable language compiler for the MOS 6502 / Commodore 64
#[derive(Parser)]
#[command(name = "sablec")]
#[command(about = "The Sable language compiler targeting the MOS 6502")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Source files to compile
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Optimization level (O0, O1, O2, O3, Os, Oz)
    #[arg(short = 'O', long, value_name = "LEVEL")]
    optimization: Option<String>,

    /// Debug info emission (none, inline, vice, both)
    #[arg(long, value_name = "MODE")]
    debug: Option<String>,

    /// Output format (asm, prg, both)
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Load address for the generated program
    #[arg(long, value_name = "ADDR")]
    load_address: Option<u16>,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,

    /// Skip the control-flow and call-graph passes
    #[arg(long)]
    no_advanced_analysis: bool,

    /// Print the IL validation report per module
    #[arg(long)]
    emit_il_report: bool,

    /// Dump diagnostics as JSON for tooling
    #[arg(long)]
    emit_json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let options = build_options(&cli)?;

    let mut sources = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("reading {}", input.display()))?;
        sources.push((input.display().to_string(), text));
    }

    let output = compile(&sources, &options);

    if cli.emit_json {
        println!("{}", serde_json::to_string_pretty(&output.diagnostics)?);
    } else {
        let rendered = sable_driver::render_diagnostics(&output);
        if !rendered.is_empty() {
            eprintln!("{}", rendered);
        }
    }

    if cli.emit_il_report {
        for unit in &output.units {
            print!("{}", sable_il::format_report(&unit.il.name, &unit.validation));
        }
    }

    if !output.success {
        bail!(
            "compilation failed with {} error(s)",
            output.diagnostics.error_count().max(1)
        );
    }

    log::info!(
        "compiled {} module(s), {} warning(s)",
        output.units.len(),
        output.diagnostics.warning_count()
    );
    Ok(())
}

/// Merge the project config (if any) with command-line overrides.
fn build_options(cli: &Cli) -> Result<CompileOptions> {
    let project_dir = cli
        .inputs
        .first()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut options = match ProjectConfig::load(&project_dir)? {
        Some(config) => config.to_options(),
        None => CompileOptions::default(),
    };

    if let Some(level) = &cli.optimization {
        options.optimization = parse_opt_level(level)
            .with_context(|| format!("unknown optimization level '{}'", level))?;
    }
    if let Some(mode) = &cli.debug {
        options.debug = match mode.as_str() {
            "none" => DebugInfo::None,
            "inline" => DebugInfo::Inline,
            "vice" => DebugInfo::Vice,
            "both" => DebugInfo::Both,
            other => bail!("unknown debug mode '{}'", other),
        };
    }
    if let Some(format) = &cli.format {
        options.output_format = parse_output_format(format)
            .with_context(|| format!("unknown output format '{}'", format))?;
    }
    if let Some(address) = cli.load_address {
        options.load_address = address;
    }
    options.strict = cli.strict;
    options.run_advanced_analysis = !cli.no_advanced_analysis;
    options.verbose = cli.verbose;

    Ok(options)
}
