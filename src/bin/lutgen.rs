use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use lutgen::{
    EvalBackend, GenerationReport, GeneratorConfig, OutputWriter, OverwritePolicy, TableGenerator,
};

#[derive(Parser)]
#[command(name = "lutgen")]
#[command(about = "Generate markdown lookup tables from a function of 2 or 3 inputs")]
#[command(version)]
struct Args {
    /// Inline closure / fn definition, or a path to a single-function source file
    #[arg(short, long)]
    function: String,

    /// Input ranges as name:start:stop:step[:unit]; the last one gives the rows
    #[arg(short, long, num_args = 2..=3, required = true)]
    ranges: Vec<String>,

    /// Table heading
    #[arg(short, long)]
    title: Option<String>,

    /// Directory the tables are written to (created if missing)
    #[arg(short, long, default_value = "output_tables")]
    output_dir: PathBuf,

    /// Notes placed under the heading, as text or a path to a markdown file
    #[arg(short, long)]
    notes: Option<String>,

    /// Decimals kept in rendered numbers
    #[arg(long)]
    precision: Option<usize>,

    /// Replace existing table files
    #[arg(long)]
    force: bool,

    /// Evaluate with the interpreter instead of JIT-compiled code
    #[arg(long)]
    interpreter: bool,

    /// Render pages on a single thread
    #[arg(long)]
    sequential: bool,

    /// JSON file with generator settings; flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(report) => {
            print_summary(&report);
            if !report.write_failures.is_empty() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<GenerationReport> {
    let config = build_config(args)?;

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "cannot create output directory {}",
            args.output_dir.display()
        )
    })?;
    let writer = OutputWriter::new(&args.output_dir, config.overwrite);

    let report =
        TableGenerator::new(config).run(&args.function, args.ranges.as_slice(), &writer)?;
    Ok(report)
}

fn build_config(args: &Args) -> Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(title) = &args.title {
        config.title = title.clone();
    }
    if let Some(notes) = &args.notes {
        config.notes = Some(load_notes(notes)?);
    }
    if let Some(precision) = args.precision {
        config.precision = precision;
    }
    if args.force {
        config.overwrite = OverwritePolicy::Overwrite;
    }
    if args.interpreter {
        config.backend = EvalBackend::Interpreter;
    }
    if args.sequential {
        config.parallel = false;
    }
    Ok(config)
}

/// Notes naming an existing file are read from it, anything else is literal text.
fn load_notes(notes: &str) -> Result<String> {
    let path = Path::new(notes.trim());
    if path.is_file() {
        fs::read_to_string(path)
            .with_context(|| format!("cannot read notes file {}", path.display()))
    } else {
        Ok(notes.to_string())
    }
}

fn print_summary(report: &GenerationReport) {
    for path in &report.written {
        println!("{} {}", "wrote".green(), path.display());
    }
    for failure in &report.write_failures {
        println!("{} {}", "failed".red(), failure);
    }

    let cells = if report.failed_cells == 0 {
        "0 failed cells".green()
    } else {
        format!("{} failed cells", report.failed_cells).yellow()
    };
    println!(
        "{}: {} of {} table(s) written, {}",
        "Summary".cyan(),
        report.written.len(),
        report.pages,
        cells
    );
}
