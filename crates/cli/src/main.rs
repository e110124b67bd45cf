//! lyricsync CLI — karaoke timings from lyrics and a reference track.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use lyricsync_core::audio::resolve_audio;
use lyricsync_core::language::align::{RunControl, get_aligner};
use lyricsync_core::language::tokenize;
use lyricsync_core::pipeline::{SyncConfig, SyncReport, reconstruct};
use lyricsync_core::types::{LineTimingResult, LyricLine, lines_from_texts};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "lyricsync",
    about = "Per-syllable karaoke timings from lyrics and forced alignment",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the flattened text submitted to the aligner
    Tokenize(TokenizeArgs),
    /// Align lyrics against audio and write line timings
    Sync(SyncArgs),
    /// Rebuild line timings from a saved aligner payload
    Refine(RefineArgs),
}

// ─── Shared arguments (embedded in each subcommand) ──────────────

#[derive(Parser, Debug)]
struct SharedArgs {
    /// Lyrics: one line per line, or a JSON array of strings (.json)
    #[arg(long)]
    lyrics: PathBuf,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct TokenizeArgs {
    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Run the forced aligner and rebuild per-syllable timings")]
struct SyncArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Audio file path or http(s) URL
    #[arg(long)]
    audio: String,

    /// Output JSON file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Aligner executable
    #[arg(long, default_value = "python3")]
    aligner_program: String,

    /// Leading argument for the aligner (repeatable), e.g. the script path
    #[arg(long = "aligner-arg")]
    aligner_args: Vec<String>,

    /// Alignment model name passed to the aligner
    #[arg(long, default_value = "small")]
    model: String,

    /// Lyrics language passed to the aligner
    #[arg(long, default_value = "en")]
    language: String,

    /// Aligner time limit in seconds (0 = no limit)
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Download time limit for remote audio, in seconds
    #[arg(long, default_value_t = 300)]
    download_timeout: u64,

    /// Keep word-level marks instead of splitting into syllables
    #[arg(long, default_value_t = false)]
    no_interpolate: bool,

    /// Disable the alignment cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Rebuild per-syllable timings from a saved word list")]
struct RefineArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Aligner payload: [{"word", "start", "end"}, ...] or {"error": ...}
    #[arg(long)]
    alignment: PathBuf,

    /// Output JSON file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep word-level marks instead of splitting into syllables
    #[arg(long, default_value_t = false)]
    no_interpolate: bool,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Tokenize(a) if a.shared.verbose => "debug",
        Command::Sync(a) if a.shared.verbose => "debug",
        Command::Refine(a) if a.shared.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Tokenize(args) => run_tokenize(args),
        Command::Sync(args) => run_sync(args),
        Command::Refine(args) => run_refine(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Read lyric lines from a text file (one per line) or a JSON string array.
fn read_lyrics(path: &Path) -> Result<Vec<LyricLine>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lyrics: {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let texts: Vec<String> = if is_json {
        serde_json::from_str(&data)
            .with_context(|| format!("Lyrics JSON must be an array of strings: {}", path.display()))?
    } else {
        data.lines().map(|l| l.trim_end_matches('\r').to_string()).collect()
    };

    if texts.is_empty() {
        bail!("No lyric lines in {}", path.display());
    }
    Ok(lines_from_texts(&texts))
}

/// Write results as pretty JSON to `output`, or stdout.
fn write_results(results: &[LineTimingResult], output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            log::info!("Wrote {} line timings to {}", results.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn summarize(report: &SyncReport, line_count: usize) {
    if let Some(e) = &report.failure {
        log::error!("Alignment failed; wrote empty timings for {} lines: {}", line_count, e);
        return;
    }
    if let Some(m) = report.count_mismatch {
        log::warn!(
            "Aligned {} of {} lines; remaining lines have no timings",
            m.actual,
            m.expected
        );
    }
    let marks: usize = report.lines.iter().map(|l| l.timings.len()).sum();
    log::info!("Timed {} lines, {} marks", report.lines.len(), marks);
}

// ─── Runners ─────────────────────────────────────────────────────

fn run_tokenize(args: TokenizeArgs) -> Result<()> {
    let lines = read_lyrics(&args.shared.lyrics)?;
    println!("{}", tokenize(&lines));
    Ok(())
}

fn run_sync(args: SyncArgs) -> Result<()> {
    let lines = read_lyrics(&args.shared.lyrics)?;
    log::info!("Loaded {} lyric lines", lines.len());

    let config = SyncConfig {
        interpolate: !args.no_interpolate,
        use_cache: !args.no_cache,
        model: args.model.clone(),
        language: args.language.clone(),
        timeout_secs: (args.timeout > 0).then_some(args.timeout),
        ..Default::default()
    };

    let mut command = vec![args.aligner_program.clone()];
    command.extend(args.aligner_args.iter().cloned());
    let aligner = get_aligner("subprocess", &command, &config.model, &config.language)?;

    // Temporary audio is removed when `audio` drops at the end of the run
    let audio = resolve_audio(&args.audio, args.download_timeout)?;
    let report = reconstruct(
        aligner.as_ref(),
        audio.path(),
        &lines,
        &config,
        &config.run_control(),
    );

    summarize(&report, lines.len());
    write_results(&report.lines, args.output.as_deref())
}

fn run_refine(args: RefineArgs) -> Result<()> {
    let lines = read_lyrics(&args.shared.lyrics)?;
    let payload = args.alignment.to_string_lossy().to_string();
    let aligner = get_aligner("replay", &[payload], "none", "none")?;

    let config = SyncConfig {
        interpolate: !args.no_interpolate,
        use_cache: false,
        ..Default::default()
    };
    let report = reconstruct(
        aligner.as_ref(),
        &args.alignment,
        &lines,
        &config,
        &RunControl::default(),
    );

    summarize(&report, lines.len());
    write_results(&report.lines, args.output.as_deref())
}
