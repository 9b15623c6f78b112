//! cardiac-endpoints CLI: cardiac endpoints from pose-tracking exports.

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam::channel::unbounded;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use cardiac_endpoints::config::{AnalysisConfig, Axis, Basis};
use cardiac_endpoints::entry::{suggest_tolerances, BatchOptions, BatchProgress, Pipeline};
use cardiac_endpoints::io::input::resolve_sources;

#[derive(Parser)]
#[command(name = "cardiac-endpoints")]
#[command(about = "Heart rate, stroke volume and beat variability from tracked ventricle landmarks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which file is used for each recording.
    Resolve {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the tolerance that would be bootstrapped for each recording.
    Tolerance {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Analyse each file and update the summary table.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Export files (.csv, .tsv, .xlsx, .xls, .ods).
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// TOML file with analysis parameters; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pixels per millimetre.
    #[arg(long)]
    conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Frames per second of the recording.
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Peak detection tolerance; the volume standard deviation when omitted.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Extremum sequence the beat intervals are measured on (maxima or minima).
    #[arg(long)]
    basis: Option<Basis>,

    /// Axis sampled for the shortening fraction.
    #[arg(long, value_enum)]
    shortening_axis: Option<AxisArg>,

    /// Frames ignored at each end of the recording.
    #[arg(long)]
    edge_margin: Option<usize>,

    /// Summary table to update.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Directory for the per-recording peak files.
    #[arg(long)]
    peaks_dir: Option<PathBuf>,

    /// Do not write peak files.
    #[arg(long)]
    no_peaks: bool,

    /// Skip files that fail instead of stopping the batch.
    #[arg(long)]
    keep_going: bool,

    /// Also analyse raw exports whose filtered version is given.
    #[arg(long)]
    keep_duplicates: bool,

    /// Print the endpoints of each file as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AxisArg {
    Long,
    Short,
}

impl From<AxisArg> for Axis {
    fn from(value: AxisArg) -> Self {
        match value {
            AxisArg::Long => Axis::Long,
            AxisArg::Short => Axis::Short,
        }
    }
}

fn load_config(common: &CommonArgs) -> Result<AnalysisConfig> {
    let mut config = match &common.config {
        Some(path) => AnalysisConfig::from_toml_file(path)?,
        None => AnalysisConfig::default(),
    };
    if common.conversion_rate.is_some() {
        config.conversion_rate = common.conversion_rate;
    }
    Ok(config)
}

fn run_resolve(common: CommonArgs) -> Result<()> {
    let config = load_config(&common)?;
    let resolved = resolve_sources(&common.paths, &config.ingest);
    for (core, path) in &resolved.files {
        println!("{}\t{}", core, path.display());
    }
    if resolved.has_duplication {
        println!("raw and filtered exports were both given; filtered ones are used");
    }
    Ok(())
}

fn run_tolerance(common: CommonArgs) -> Result<()> {
    let config = load_config(&common)?;
    for suggestion in suggest_tolerances(&common.paths, &config)? {
        println!("{}\t{}", suggestion.core_name, suggestion.tolerance);
    }
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if args.frame_rate.is_some() {
        config.frame_rate = args.frame_rate;
    }
    if args.tolerance.is_some() {
        config.tolerance = args.tolerance;
    }
    if let Some(basis) = args.basis {
        config.basis = basis;
    }
    if let Some(axis) = args.shortening_axis {
        config.shortening_axis = axis.into();
    }
    if let Some(margin) = args.edge_margin {
        config.edge_margin = margin;
    }
    if let Some(summary) = args.summary {
        config.summary_path = summary;
    }
    if let Some(dir) = args.peaks_dir {
        config.peaks_dir = dir;
    }

    // Fail before touching any file.
    config.conversion_rate()?;
    config.frame_rate()?;
    config.tolerance()?;

    let mut pipeline = Pipeline::new(config);
    if args.no_peaks {
        pipeline = pipeline.with_peak_sink(None);
    }

    let options = BatchOptions {
        keep_going: args.keep_going,
        keep_duplicates: args.keep_duplicates,
    };
    let (tx, rx) = unbounded::<BatchProgress>();
    let report = crossbeam::thread::scope(|s| {
        s.spawn(move |_| {
            for progress in rx.iter() {
                info!(
                    "[{}/{} {:>3}%] {} {}",
                    progress.done,
                    progress.total,
                    progress.percent(),
                    progress.path.display(),
                    if progress.ok { "done" } else { "failed" }
                );
            }
        });
        let report = pipeline.run_batch(&args.common.paths, Some(&tx), options);
        drop(tx);
        report
    })
    .map_err(|_| anyhow!("progress thread panicked"))??;

    if args.json {
        for file in &report.succeeded {
            println!(
                "{}",
                serde_json::json!({
                    "file": file.path.display().to_string(),
                    "recording": file.core_name,
                    "endpoints": file.analysis.endpoints,
                })
            );
        }
    } else {
        for file in &report.succeeded {
            println!("{}", file.core_name);
            for (name, value) in file.analysis.endpoints.entries() {
                println!("  {:<26}{}", name, value);
            }
        }
    }

    for (path, e) in &report.failed {
        eprintln!("failed: {}: {:#}", path.display(), e);
    }
    info!(
        "summary written to {}",
        pipeline.config().summary_path.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        Env::default()
            .filter_or("CARDIAC_LOG_LEVEL", "info")
            .write_style_or("CARDIAC_LOG_STYLE", "auto"),
    )
    .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Resolve { common } => run_resolve(common),
        Commands::Tolerance { common } => run_tolerance(common),
        Commands::Analyze(args) => run_analyze(args),
    }
}
