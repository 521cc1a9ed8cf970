use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use drum_beat_analyzer::analysis::peak_picker::{threshold_from_sensitivity, MAX_SENSITIVITY};
use drum_beat_analyzer::config::{AnalyzerConfig, GridMode, ScanPolicy};
use drum_beat_analyzer::fixtures::synthetic::{write_wav, SyntheticPattern};
use drum_beat_analyzer::fixtures::{ExpectationDiff, FixtureCatalog, FixtureProcessor};
use drum_beat_analyzer::Difficulty;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "beatgrid_cli",
    about = "Deterministic beat-grid fixture harness for the drum beat analyzer"
)]
struct Cli {
    /// Override directory containing fixture assets (defaults to ./fixtures)
    #[arg(long, global = true)]
    fixtures_dir: Option<PathBuf>,
    /// Log pipeline decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a fixture through the analyzer and optionally compare against expectations
    Analyze {
        #[arg(long)]
        fixture: String,
        #[arg(long)]
        expect: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "normal")]
        difficulty: Difficulty,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// Stream peak events for a fixture to stdout, one JSON object per line
    Stream {
        #[arg(long)]
        fixture: String,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// Render a synthetic drum pattern to a mono 16-bit WAV fixture
    Render {
        #[arg(long)]
        output: PathBuf,
        /// Hit positions in sixteenth-note steps, comma separated
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        steps: Vec<f64>,
        #[arg(long, default_value_t = 90.0)]
        bpm: f64,
        #[arg(long, default_value_t = 5)]
        lead_in_blocks: usize,
        #[arg(long)]
        total_blocks: Option<usize>,
        /// Uniform noise amplitude relative to full scale
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// List available fixtures on disk
    DumpFixtures,
}

#[derive(Args, Debug)]
struct AnalyzerArgs {
    /// JSON analyzer configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    bpm: Option<f64>,
    /// Detection sensitivity 0-10 (maps to threshold (11 - s) / 100)
    #[arg(long, conflicts_with = "threshold",
          value_parser = clap::value_parser!(u8).range(0..=MAX_SENSITIVITY as i64))]
    sensitivity: Option<u8>,
    /// Fixed envelope threshold t1
    #[arg(long)]
    threshold: Option<f32>,
    /// Accept only the first peak per block
    #[arg(long)]
    first_peak: bool,
    /// Log beats without wrapping instead of filling the two-bar grid
    #[arg(long)]
    beat_log: bool,
}

impl AnalyzerArgs {
    fn resolve(&self) -> AnalyzerConfig {
        let mut config = self
            .config
            .as_ref()
            .map(AnalyzerConfig::load_from_file)
            .unwrap_or_default();

        if let Some(bpm) = self.bpm {
            config.grid.bpm = bpm;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.peak_picking.threshold = threshold_from_sensitivity(sensitivity);
        }
        if let Some(threshold) = self.threshold {
            config.peak_picking.threshold = threshold;
        }
        if self.first_peak {
            config.peak_picking.scan_policy = ScanPolicy::FirstPeak;
        }
        if self.beat_log {
            config.grid.mode = GridMode::BeatLog;
        }
        config
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let catalog = cli
        .fixtures_dir
        .map(FixtureCatalog::new)
        .unwrap_or_default();

    match cli.command {
        Commands::Analyze {
            fixture,
            expect,
            output,
            difficulty,
            analyzer,
        } => run_analyze(&catalog, &fixture, expect, output, difficulty, &analyzer),
        Commands::Stream { fixture, analyzer } => run_stream(&catalog, &fixture, &analyzer),
        Commands::Render {
            output,
            steps,
            bpm,
            lead_in_blocks,
            total_blocks,
            noise,
            seed,
        } => {
            let mut pattern = SyntheticPattern::new(bpm, steps)
                .with_lead_in_blocks(lead_in_blocks)
                .with_noise(noise, seed);
            pattern.total_blocks = total_blocks;
            run_render(&pattern, &output)
        }
        Commands::DumpFixtures => run_dump(&catalog),
    }
}

/// Human-readable logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run_analyze(
    catalog: &FixtureCatalog,
    fixture: &str,
    override_expect: Option<PathBuf>,
    output_path: Option<PathBuf>,
    difficulty: Difficulty,
    args: &AnalyzerArgs,
) -> Result<ExitCode> {
    let processor = FixtureProcessor::new(args.resolve()).with_difficulty(difficulty);
    let data = catalog.load(fixture, override_expect)?;
    let report = processor
        .run(&data)
        .with_context(|| format!("processing fixture {}", fixture))?;

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    if let Some(expectations) = data.expectations {
        match expectations.verify(&report.events) {
            Ok(()) => Ok(ExitCode::from(0)),
            Err(diff) => {
                emit_diff(&diff)?;
                Ok(ExitCode::from(2))
            }
        }
    } else {
        Ok(ExitCode::from(0))
    }
}

fn run_stream(catalog: &FixtureCatalog, fixture: &str, args: &AnalyzerArgs) -> Result<ExitCode> {
    let processor = FixtureProcessor::new(args.resolve());
    let data = catalog.load(fixture, None)?;
    processor
        .run_with(&data, |event| {
            println!("{}", serde_json::to_string(event)?);
            Ok(())
        })
        .with_context(|| format!("processing fixture {}", fixture))?;

    Ok(ExitCode::from(0))
}

fn run_render(pattern: &SyntheticPattern, output: &Path) -> Result<ExitCode> {
    let stream = AnalyzerConfig::default().stream;
    let samples = pattern.render(&stream);
    write_wav(output, &samples, stream.sample_rate)?;

    let summary = serde_json::json!({
        "output": output,
        "sample_rate": stream.sample_rate,
        "blocks": samples.len() / stream.block_size,
        "samples": samples.len(),
        "pattern": pattern,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(0))
}

fn run_dump(catalog: &FixtureCatalog) -> Result<ExitCode> {
    let fixtures = catalog.discover()?;
    if fixtures.is_empty() {
        println!("No fixtures found under {}", catalog.root().display());
        return Ok(ExitCode::from(0));
    }

    for metadata in fixtures {
        if let Some(expect) = metadata.expect_path {
            println!("{} -> {}", metadata.name, expect.display());
        } else {
            println!("{}", metadata.name);
        }
    }
    Ok(ExitCode::from(0))
}

fn emit_diff(diff: &ExpectationDiff) -> Result<()> {
    let json = serde_json::to_string_pretty(&diff.to_json())?;
    eprintln!("{json}");
    Ok(())
}
