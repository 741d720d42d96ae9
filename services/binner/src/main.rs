//! Level-3 binning command.
//!
//! Bins observation files (JSON lines) onto a planetary grid and writes the
//! configured product.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use binning::{BinningConfig, BinningPipeline, JsonLinesSource, MergeStrategy};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "binner")]
#[command(about = "Spatio-temporal binning of observation files")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "BINNING_CONFIG")]
    config: PathBuf,

    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (overrides the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Abort on the first unreadable input file
    #[arg(long)]
    strict: bool,

    /// Spill per-file bins to disk instead of merging in memory
    #[arg(long)]
    spill: bool,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// File extension picked up when walking directories
    #[arg(long, default_value = "jsonl")]
    extension: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let mut config = BinningConfig::from_yaml_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.apply_env();
    if let Some(output) = &args.output {
        config.output.output_file = output.clone();
    }
    if args.strict {
        config.strict = true;
    }
    if args.spill {
        config.merge_strategy = MergeStrategy::Spill;
    }
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }

    let files = discover_inputs(&args.inputs, &args.extension)?;
    if files.is_empty() {
        bail!("no .{} input files found", args.extension);
    }
    info!(
        files = files.len(),
        grid = %config.grid.kind.as_str(),
        output = %config.output.output_file.display(),
        "Starting binning run"
    );

    let pipeline = BinningPipeline::new(config, Arc::new(JsonLinesSource))
        .context("setting up the binning pipeline")?;
    let outcome = pipeline.run(&files).context("binning run failed")?;

    let summary = &outcome.summary;
    for fault in &summary.file_faults {
        warn!(path = %fault.path.display(), error = %fault.message, "Skipped input file");
    }
    info!(
        files_binned = summary.files_binned,
        files_total = summary.files_total,
        accepted = summary.stats.accepted,
        out_of_domain = summary.stats.rejected_out_of_domain,
        outside_region = summary.stats.rejected_outside_region,
        outside_time_range = summary.stats.rejected_outside_time_range,
        no_valid_channel = summary.stats.rejected_no_valid_channel,
        invalid_weight = summary.stats.rejected_invalid_weight,
        bins = summary.num_bins,
        "Binning complete"
    );
    if let Some(render) = &summary.render_stats {
        info!(
            pixels_with_data = render.pixels_with_data,
            pixels_missing = render.pixels_missing,
            clamped_pixels = render.clamped_pixels,
            "Rendered raster"
        );
    }
    match &outcome.product {
        Some(product) => {
            for path in &product.paths {
                info!(path = %path.display(), "Wrote output");
            }
        }
        None => warn!("No observation was binned; nothing written"),
    }

    Ok(())
}

/// Expand directories into their matching files, sorted for reproducible runs.
fn discover_inputs(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            bail!("input {} does not exist", input.display());
        }
        for entry in WalkDir::new(input).follow_links(true) {
            let entry = entry.with_context(|| format!("walking {}", input.display()))?;
            if entry.file_type().is_file() && has_extension(entry.path(), extension) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
