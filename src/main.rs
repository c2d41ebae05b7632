use anyhow::{Context, Result};
use beat_catalog::analysis::{StratumLoader, SymphoniaDecoder};
use beat_catalog::model::Beat;
use beat_catalog::store::SqliteBeatStore;
use beat_catalog::{AnalysisClient, ImportConfig, ImportMode, ImportPipeline};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "beat-catalog")]
#[command(about = "Analyze audio files and import them into a beat catalog", long_about = None)]
struct Args {
    /// Folder to import
    folder: Option<PathBuf>,

    /// Path to the beat database
    #[arg(
        short = 'd',
        long,
        default_value = "~/.local/share/beat-catalog/beats.db"
    )]
    database: String,

    /// Store a copy of each file instead of a path to it
    #[arg(long)]
    flat: bool,

    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_links: bool,

    /// Fold detected tempos up to at least this BPM (requires --max-bpm)
    #[arg(long, requires = "max_bpm")]
    min_bpm: Option<f32>,

    /// Fold detected tempos down to at most this BPM (requires --min-bpm)
    #[arg(long, requires = "min_bpm")]
    max_bpm: Option<f32>,

    /// Give up on a file after this many seconds of analysis
    #[arg(long)]
    timeout: Option<u64>,

    /// Analyze at most this many seconds of each file
    #[arg(long)]
    max_seconds: Option<u32>,

    /// Print the import outcome as JSON
    #[arg(long)]
    json: bool,

    /// List stored beats instead of importing
    #[arg(long)]
    list: bool,

    /// List stored beats carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    /// Tempo folding range, only when both bounds were given
    fn bpm_range(&self) -> Option<(f32, f32)> {
        self.min_bpm.zip(self.max_bpm)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Expand ~ in the database path
    let db_path = PathBuf::from(shellexpand::tilde(&args.database).as_ref());
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    let store = SqliteBeatStore::open(&db_path)
        .with_context(|| format!("Failed to open beat database {:?}", db_path))?;

    if args.list || args.tag.is_some() {
        let beats = match &args.tag {
            Some(tag) => store.find_by_tag(tag)?,
            None => store.list()?,
        };
        for beat in &beats {
            print_beat(beat);
        }
        log::info!("{} beats", beats.len());
        return Ok(());
    }

    let folder = args
        .folder
        .as_deref()
        .context("A folder to import is required (or use --list)")?;

    log::info!("Beat Catalog import");
    log::info!("===================");
    log::info!("Database: {:?}", db_path);

    let mut loader = StratumLoader::new();
    if let Some((min, max)) = args.bpm_range() {
        loader = loader.with_bpm_range(min, max);
    }
    let mut decoder = SymphoniaDecoder::new();
    if let Some(seconds) = args.max_seconds {
        decoder = decoder.with_max_seconds(seconds);
    }
    let mut client = AnalysisClient::new(Arc::new(loader), Arc::new(decoder));
    if let Some(secs) = args.timeout {
        client = client.with_reply_timeout(Duration::from_secs(secs));
    }

    let config = ImportConfig::new().with_follow_links(args.follow_links);
    let mode = if args.flat {
        ImportMode::Flat
    } else {
        ImportMode::Recursive
    };

    let pipeline = ImportPipeline::new(config, client, store);
    let outcome = pipeline.import_directory(folder, mode, |progress| {
        log::debug!(
            "{} imported, {} failed so far",
            progress.imported_count,
            progress.failed_count
        );
    });
    pipeline.analyzer().shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.summary());
        for failure in &outcome.errors {
            println!("  {}: {}", failure.file, failure.message);
        }
    }

    log::info!("Catalog now holds {} beats", pipeline.store().count()?);
    Ok(())
}

fn print_beat(beat: &Beat) {
    let location = match beat.file_path() {
        Some(path) => path.display().to_string(),
        None => "(stored copy)".to_string(),
    };
    println!(
        "{}  {:>7.2}  {:<9}  {}  {}",
        beat.id, beat.bpm, beat.key, beat.title, location
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_folding_is_off_by_default() {
        let args = Args::try_parse_from(["beat-catalog", "/music"]).unwrap();
        assert_eq!(args.bpm_range(), None);
    }

    #[test]
    fn test_tempo_folding_needs_both_bounds() {
        let args =
            Args::try_parse_from(["beat-catalog", "/music", "--min-bpm", "70", "--max-bpm", "170"])
                .unwrap();
        assert_eq!(args.bpm_range(), Some((70.0, 170.0)));

        assert!(Args::try_parse_from(["beat-catalog", "/music", "--min-bpm", "70"]).is_err());
    }
}
