use clap::{Parser, Subcommand};
use oggprobe::io_stream::SeekableSource;
use oggprobe::probe::{ProbeController, ProbeResult};
use oggprobe::recovery::scan_file;
use oggprobe::ProbeConfig;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Header bytes read before probing, as a generic file-open path would.
const SNIFF_LEN: usize = 12;

#[derive(Parser)]
#[command(name = "oggprobe", version, about = "Identify and inspect Ogg bitstreams")]
struct Cli {
    /// Log decisions at debug level
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the first logical stream of each file
    Probe {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// Bytes read to find the first page
        #[arg(short, long)]
        budget: Option<usize>,
        /// JSON probe configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Walk every page of a file and report damage
    Scan {
        input: PathBuf,
        #[arg(long)]
        json: bool,
        /// Also list every page
        #[arg(short, long)]
        pages: bool,
    },
}

#[derive(Serialize)]
struct FileResult {
    path:   PathBuf,
    result: ProbeResult,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── Probe ────────────────────────────────────────────────────────────
        Commands::Probe { files, json, budget, config } => {
            let mut cfg = match config {
                Some(path) => ProbeConfig::from_json_file(&path)?,
                None       => ProbeConfig::default(),
            };
            if let Some(bytes) = budget {
                cfg = cfg.probe_budget(bytes);
            }

            let results = probe_all(&files, &cfg);
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for r in &results {
                    println!("{}: {}", r.path.display(), r.result);
                }
            }
            if results.iter().any(|r| r.result.is_error()) {
                std::process::exit(1);
            }
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input, json, pages } => {
            let report = scan_file(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("{}", report.summary());
            println!("{:>10} {:>8} {:>7} {:>8}  {:<3} {:<3}  Codec",
                     "Serial", "Offset", "Pages", "Packets", "BOS", "EOS");
            for s in &report.streams {
                let codec = match (&s.codec, &s.unknown) {
                    (Some(c), _)    => c.to_string(),
                    (None, Some(d)) => format!("unknown {d}"),
                    (None, None)    => "-".into(),
                };
                println!("{:>10} {:>8} {:>7} {:>8}  {:<3} {:<3}  {}{}",
                    format!("{:08x}", s.serial), s.first_offset, s.pages, s.packets,
                    yes_no(s.bos), yes_no(s.eos), codec,
                    if s.sequence_gaps > 0 { format!("  ({} gap(s))", s.sequence_gaps) } else { String::new() });
            }
            if pages {
                println!();
                for p in &report.page_log {
                    println!("  @{:<10} serial={:08x} seq={:<6} flags={:#04x} granule={:<12} segs={:<3} body={}",
                        p.offset, p.serial, p.sequence, p.flags, p.granule_position, p.segments, p.body_len);
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn probe_all(files: &[PathBuf], config: &ProbeConfig) -> Vec<FileResult> {
    #[cfg(feature = "parallel")]
    let iter = files.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = files.iter();

    iter.map(|path| FileResult { path: path.clone(), result: probe_path(path, config) })
        .collect()
}

fn probe_path(path: &Path, config: &ProbeConfig) -> ProbeResult {
    let file = match File::open(path) {
        Ok(f)  => f,
        Err(e) => return ProbeResult::Failed(e.to_string()),
    };
    let mut source = match SeekableSource::sniffed(file, SNIFF_LEN) {
        Ok(s)  => s,
        Err(e) => return ProbeResult::Failed(e.to_string()),
    };
    let mut controller = ProbeController::new(config.clone());
    let outcome = controller.probe(&mut source);
    ProbeResult::from_outcome(&outcome, |probed| probed.codec)
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}
