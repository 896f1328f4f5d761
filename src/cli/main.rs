use anyhow::Result;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

use metascramble::{config, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "metascramble",
    version,
    about = "Strip or fabricate descriptive metadata in JPEG, PNG, GIF, MP3, PDF, and DOCX files"
)]
struct Cli {
    /// Files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Only remove existing metadata; fabricate nothing
    #[arg(long = "strip-only")]
    strip_only: bool,

    /// Omit fabricated GPS coordinates
    #[arg(long = "no-gps")]
    no_gps: bool,

    /// Re-encode raster pixels at this JPEG quality (1-100)
    #[arg(long, value_name = "QUALITY")]
    quality: Option<u8>,

    /// Overwrite input files instead of writing suffixed siblings
    #[arg(long = "in-place")]
    in_place: bool,

    /// Set output file timestamps to the fabricated date
    #[arg(long)]
    touch: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Load config, then apply CLI overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.strip_only {
        config.policy.strip_only = true;
    }
    if cli.no_gps {
        config.policy.add_fake_gps = false;
    }
    if let Some(quality) = cli.quality {
        config.policy.recompress_quality = Some(quality);
    }
    if cli.in_place {
        config.output.in_place = true;
    }
    if cli.touch {
        config.output.touch_file_times = true;
    }
    if cli.dry_run {
        config.output.dry_run = true;
    }

    // Collect files
    let files = pipeline::collect_files(&cli.paths);
    if files.is_empty() {
        anyhow::bail!("No supported files found in the specified paths.");
    }

    log::info!("Found {} file(s) to process", files.len());
    if config.output.dry_run {
        log::info!("DRY RUN — no files will be modified");
    }
    if config.policy.strip_only {
        log::info!("Strip-only mode — no records will be fabricated");
    }

    // Process each file
    let mut rng = StdRng::from_entropy();
    let mut results = Vec::new();
    let total = files.len();

    for (i, path) in files.iter().enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, path.display());

        let result = pipeline::process_file(path, &config, &mut rng);

        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else if result.skipped {
            log::warn!("  Skipped (unsupported container)");
        } else {
            if let Some(kind) = result.kind {
                log::info!("  Container: {}", kind.name());
            }
            if let Some(ref record) = result.record {
                if !config.policy.strip_only {
                    log::debug!("  Author: {}", record.author);
                    log::debug!("  Timestamp: {}", record.iso_8601());
                }
            }
            match result.output_path {
                Some(ref out) => log::info!(
                    "  Wrote {} ({} -> {} bytes)",
                    out.display(),
                    result.bytes_in,
                    result.bytes_out
                ),
                None => log::info!("  Would write {} bytes", result.bytes_out),
            }
        }

        results.push(result);
    }

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "output_path": r.output_path.as_ref().map(|p| p.display().to_string()),
                    "container": r.kind.map(|k| k.name()),
                    "record": r.record,
                    "bytes_in": r.bytes_in,
                    "bytes_out": r.bytes_out,
                    "skipped": r.skipped,
                    "error": r.error,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none() && !r.skipped).count();
    let skipped = results.iter().filter(|r| r.skipped).count();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    log::info!("Done: {success} scrambled, {skipped} skipped, {failed} failed out of {total} files");

    Ok(())
}
