use anyhow::{Context, Result};
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::dispatch::{self, ContainerKind};
use crate::raster;
use crate::record::MetadataRecord;
use crate::ScrambleError;

/// Supported container extensions.
const CONTAINER_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "mp3", "pdf", "doc", "docx",
];

/// The result of processing a single file.
///
/// A file is either scrambled (output written, `error` is `None`),
/// skipped (`skipped` set — unrecognized or unsupported container), or
/// failed (`error` set). Failures never leave a partial output file:
/// the transform runs fully in memory and the output path is written in
/// a single whole-file operation only after validation.
#[derive(Debug)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// Where the scrambled bytes were written (`None` for dry runs,
    /// skips, and failures).
    pub output_path: Option<PathBuf>,
    pub kind: Option<ContainerKind>,
    /// The fabricated record used for this file.
    pub record: Option<MetadataRecord>,
    pub bytes_in: usize,
    pub bytes_out: usize,
    /// Unrecognized or unsupported container — not an error, the batch
    /// moves on.
    pub skipped: bool,
    pub error: Option<String>,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output_path: None,
            kind: None,
            record: None,
            bytes_in: 0,
            bytes_out: 0,
            skipped: false,
            error: None,
        }
    }
}

/// Collect supported container files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are
/// walked recursively (following symlinks); only files with supported
/// extensions are included.
///
/// # Example
///
/// ```rust,no_run
/// use metascramble::pipeline::collect_files;
/// use std::path::PathBuf;
///
/// let files = collect_files(&[
///     PathBuf::from("photo.jpg"),      // single file
///     PathBuf::from("./documents/"),   // entire directory
/// ]);
/// println!("Found {} files", files.len());
/// ```
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_file(path) {
                files.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_file(p) {
                    files.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    files
}

/// Check if a file has a supported container extension.
fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CONTAINER_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Create a backup of the original file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Sibling output path: `photo.jpg` → `photo.<suffix>.jpg`.
fn output_path_for(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{suffix}"),
    };
    path.with_file_name(name)
}

/// Set the file's modification and access times to the fabricated
/// timestamp (the optional side channel — failure is logged, not fatal).
fn touch_file_times(path: &Path, record: &MetadataRecord) -> Result<()> {
    let when = filetime::FileTime::from_unix_time(record.timestamp.timestamp(), 0);
    filetime::set_file_times(path, when, when).context("Failed to set file times")?;
    Ok(())
}

/// Append one summary line per processed file to the audit log.
/// Concurrent batch drivers must serialize on the log path themselves.
fn append_audit_line(log_path: &str, result: &ProcessResult) -> Result<()> {
    let status = match (&result.error, result.skipped) {
        (Some(err), _) => format!("error: {err}"),
        (None, true) => "skipped".to_string(),
        (None, false) => "ok".to_string(),
    };
    let kind = result.kind.map(|k| k.name()).unwrap_or("unknown");
    let line = format!("{}\t{}\t{status}\n", result.path.display(), kind);

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_path)
        .context("Failed to open audit log")?;
    file.write_all(line.as_bytes()).context("Failed to append audit log line")?;
    Ok(())
}

/// Process a single file: read, detect, scramble, write.
///
/// The full flow:
///
/// 1. **Detect** — container kind from content signature, falling back
///    to the file extension
/// 2. **Fabricate** — generate the per-file [`MetadataRecord`] from the
///    injected random source
/// 3. **Recompress** — optional pixel re-encode for raster kinds (runs
///    before the metadata pass so the fabricated record survives)
/// 4. **Scramble** — strip and, per policy, rebuild the metadata
/// 5. **Write** — whole-file write to the resolved output path, then the
///    optional timestamp touch and audit log append
///
/// Per-file failures are recorded in the result; callers drive retry or
/// abort policy themselves.
pub fn process_file<R: Rng + ?Sized>(
    path: &Path,
    config: &Config,
    rng: &mut R,
) -> ProcessResult {
    let mut result = ProcessResult::new(path);

    let mut data = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            result.error = Some(format!("Failed to read file: {e}"));
            return result;
        }
    };
    result.bytes_in = data.len();

    let kind = match ContainerKind::detect(&data).or_else(|| ContainerKind::from_path(path)) {
        Some(kind) => kind,
        None => {
            log::warn!("Unrecognized container: {}", path.display());
            result.skipped = true;
            return result;
        }
    };
    result.kind = Some(kind);

    let record = MetadataRecord::generate(rng);
    result.record = Some(record.clone());

    if let Some(quality) = config.policy.recompress_quality {
        if matches!(kind, ContainerKind::Jpeg | ContainerKind::Png | ContainerKind::Gif) {
            match raster::recompress(&data, kind, quality) {
                Ok(bytes) => data = bytes,
                Err(e) => {
                    result.error = Some(format!("Recompression failed: {e}"));
                    return result;
                }
            }
        }
    }

    let output = match dispatch::scramble(&data, kind, &config.policy, &record) {
        Ok(bytes) => bytes,
        Err(ScrambleError::UnsupportedContainer) => {
            log::warn!("Unsupported container ({}): {}", kind.name(), path.display());
            result.skipped = true;
            return result;
        }
        Err(e) => {
            result.error = Some(format!("Scramble failed: {e}"));
            return result;
        }
    };
    result.bytes_out = output.len();

    if config.output.dry_run {
        log::info!("DRY RUN — not writing {}", path.display());
        return result;
    }

    let output_path = if config.output.in_place {
        if config.output.backup_originals {
            if let Err(e) = backup_file(path) {
                log::warn!("Failed to backup {}: {e}", path.display());
            }
        }
        path.to_path_buf()
    } else {
        output_path_for(path, &config.output.suffix)
    };

    if let Err(e) = std::fs::write(&output_path, &output) {
        result.error = Some(format!("Failed to write output: {e}"));
        return result;
    }
    result.output_path = Some(output_path.clone());

    if config.output.touch_file_times {
        if let Err(e) = touch_file_times(&output_path, &record) {
            log::warn!("Failed to touch {}: {e}", output_path.display());
        }
    }

    if let Some(ref log_path) = config.output.log_file {
        if let Err(e) = append_audit_line(log_path, &result) {
            log::warn!("Failed to write audit log: {e}");
        }
    }

    result
}
