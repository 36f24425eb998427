use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use trackmatch::catalog::SqliteCatalog;
use trackmatch::config::MatchConfig;
use trackmatch::logging::init_logging;
use trackmatch::models::{Candidate, Track};
use trackmatch::orchestrator::{CancellationToken, MatchOrchestrator};
use trackmatch::playlist::match_playlist_with_stats;
use trackmatch::progress::{create_progress_bar, create_spinner, format_duration};
use trackmatch::safety::validate_output_path;
use trackmatch::telemetry::{FanoutSink, QueryMetrics, TracingSink};

#[derive(Parser)]
#[command(name = "trackmatch")]
#[command(about = "Match playlist tracks against a music catalog")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Hide progress bars and log progress lines instead (tail-friendly)
    #[arg(long, global = true)]
    log_only: bool,

    /// Default log level for this crate (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Build a local catalog from a JSON array of candidates
    Import {
        candidates: PathBuf,
        catalog: PathBuf,
    },

    /// Match every track of a JSON playlist against a catalog
    Match {
        playlist: PathBuf,
        catalog: PathBuf,

        /// Write results here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// JSON matching configuration (defaults for missing fields)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads (0 = one per core)
        #[arg(long, default_value = "0")]
        workers: usize,

        /// Write run statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Show the generated queries and the match for a single track
    Query {
        catalog: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        artist: String,

        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} {}", what, path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse {} {}", what, path.display()))
}

fn load_config(path: Option<&Path>) -> Result<MatchConfig> {
    let config = match path {
        Some(path) => read_json(path, "config")?,
        None => MatchConfig::default(),
    };
    config.validate().context("Invalid matching configuration")?;
    Ok(config)
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
        }
        None => {
            let stdout = std::io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), value)?;
            println!();
        }
    }
    Ok(())
}

fn import(candidates_path: &Path, catalog_path: &Path, log_only: bool) -> Result<()> {
    let start = Instant::now();
    let candidates: Vec<Candidate> = read_json(candidates_path, "candidates")?;
    info!("Read {} candidates from {:?}", candidates.len(), candidates_path);

    let catalog = SqliteCatalog::create(catalog_path)?;

    let spinner = create_spinner("Writing catalog", log_only);
    let written = catalog.insert(&candidates)?;
    spinner.finish_with_message(format!("Wrote {} candidates", written));

    let spinner = create_spinner("Building FTS index", log_only);
    catalog.rebuild_index()?;
    spinner.finish_with_message("FTS index built");

    info!(
        "Catalog ready: {} rows in {:?} ({})",
        catalog.len()?,
        catalog_path,
        format_duration(start.elapsed())
    );
    Ok(())
}

struct MatchArgs {
    playlist: PathBuf,
    catalog: PathBuf,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    workers: usize,
    stats: Option<PathBuf>,
}

fn run_match(args: MatchArgs, log_only: bool) -> Result<()> {
    let sources = [args.playlist.as_path(), args.catalog.as_path()];
    for out in [&args.output, &args.stats].into_iter().flatten() {
        validate_output_path(out, "json", &sources)?;
    }

    let config = load_config(args.config.as_deref())?;
    let tracks: Vec<Track> = read_json(&args.playlist, "playlist")?;
    info!("Loaded {} tracks from {:?}", tracks.len(), args.playlist);

    let catalog = SqliteCatalog::open(&args.catalog)?;
    let metrics = Arc::new(QueryMetrics::new());
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(metrics.clone());
    let orchestrator = MatchOrchestrator::new(config, &catalog)?.with_telemetry(&sink);

    let pb = create_progress_bar(tracks.len() as u64, "Matching", log_only);
    let cancel = CancellationToken::new();
    let (results, stats) =
        match_playlist_with_stats(&orchestrator, &tracks, args.workers, &cancel, Some(&pb))?;
    pb.finish_with_message(format!("Matched {} tracks", results.len()));

    write_json(&results, args.output.as_deref())?;

    stats.log_phase("match");
    if let Ok(json) = serde_json::to_string_pretty(&metrics.snapshot()) {
        info!("[QUERIES]\n{}", json);
    }
    info!(
        "Match rate {:.1}%, {:.1}% of planned queries skipped, elapsed {}",
        stats.match_rate(),
        stats.query_savings(),
        format_duration(std::time::Duration::from_secs_f64(stats.elapsed_seconds))
    );
    if let Some(path) = &args.stats {
        stats.write_to_file(path)?;
    }
    Ok(())
}

fn query(catalog_path: &Path, track: Track, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let catalog = SqliteCatalog::open(catalog_path)?;
    let orchestrator = MatchOrchestrator::new(config, &catalog)?;

    match orchestrator.plan(&track) {
        Ok(plan) => {
            println!("Mix: {:?} (clean title: {:?})", plan.mix_info.mix_type, plan.mix_info.clean_title);
            println!("{:-<80}", "");
            for q in &plan.queries {
                println!("[{}] {:<10} {}", q.priority_index, q.query_type.as_str(), q.text);
            }
            println!("{:-<80}", "");
        }
        Err(e) => println!("Track rejected: {}", e),
    }

    let result = orchestrator.run(&track, &CancellationToken::new());
    match &result.best {
        Some(best) => println!(
            "Best: {} - {} ({:.1}, {})",
            best.candidate.artists.join(", "),
            best.candidate.title,
            best.total_score,
            best.confidence_label.as_str()
        ),
        None => println!("No match ({:?})", result.status),
    }
    write_json(&result, None)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_only)?;

    match args.command {
        Command::Import { candidates, catalog } => import(&candidates, &catalog, args.log_only),
        Command::Match { playlist, catalog, output, config, workers, stats } => run_match(
            MatchArgs { playlist, catalog, output, config, workers, stats },
            args.log_only,
        ),
        Command::Query { catalog, title, artist, key, year, config } => {
            let track = Track { title, artist, year, key, bpm: None };
            query(&catalog, track, config.as_deref())
        }
    }
}
