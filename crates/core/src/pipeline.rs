//! One lyric synchronization run: tokenize → align → segment → interpolate.
//!
//! An aligner failure never escapes as an error. The report carries it and
//! falls back to one empty-timing result per input line so callers can
//! persist a structurally valid result either way.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cache::{self, AlignmentKey};
use crate::error::AlignError;
use crate::language::align::{Aligner, RunControl};
use crate::language::{interpolate, segment, tokenize};
use crate::types::{LineTimingResult, LyricLine, TimedToken};

/// Settings for a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Expand word marks into per-syllable marks
    pub interpolate: bool,
    /// Reuse cached aligner output
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    /// Recorded in the cache key
    pub model: String,
    pub language: String,
    /// Aligner time box in seconds (None = unbounded)
    pub timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interpolate: true,
            use_cache: true,
            cache_dir: cache::cache_dir(),
            model: "small".to_string(),
            language: "en".to_string(),
            timeout_secs: Some(600),
        }
    }
}

impl SyncConfig {
    /// Run control carrying this config's time box.
    pub fn run_control(&self) -> RunControl {
        RunControl {
            timeout: self.timeout_secs.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

/// Segmented line count differs from the input line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct SyncReport {
    pub lines: Vec<LineTimingResult>,
    /// Set when the aligner failed; `lines` then holds empty timings
    pub failure: Option<AlignError>,
    pub count_mismatch: Option<CountMismatch>,
}

impl SyncReport {
    pub fn is_aligned(&self) -> bool {
        self.failure.is_none()
    }
}

/// One empty-timing result per input line.
pub fn empty_results(lines: &[LyricLine]) -> Vec<LineTimingResult> {
    lines.iter().map(LineTimingResult::empty).collect()
}

/// Rebuild per-line results from the aligner's flat token list.
pub fn reconstruct_from_tokens(
    tokens: &[TimedToken],
    lines: &[LyricLine],
    interpolate_syllables: bool,
) -> (Vec<LineTimingResult>, Option<CountMismatch>) {
    let segmented = segment(tokens, lines);

    let count_mismatch = if segmented.len() != lines.len() {
        log::warn!(
            "Line count mismatch: {} lyric lines, {} aligned lines",
            lines.len(),
            segmented.len()
        );
        Some(CountMismatch {
            expected: lines.len(),
            actual: segmented.len(),
        })
    } else {
        None
    };

    let results = if interpolate_syllables {
        interpolate(&segmented)
    } else {
        segmented
    };

    (results, count_mismatch)
}

/// Run the aligner over `audio_path` and rebuild per-line timings.
pub fn reconstruct(
    aligner: &dyn Aligner,
    audio_path: &Path,
    lines: &[LyricLine],
    config: &SyncConfig,
    control: &RunControl,
) -> SyncReport {
    if lines.is_empty() {
        return SyncReport {
            lines: Vec::new(),
            failure: None,
            count_mismatch: None,
        };
    }

    let text = tokenize(lines);
    log::debug!("Aligner text: {}", text);

    let tokens = match align_cached(aligner, audio_path, &text, config, control) {
        Ok(tokens) => tokens,
        Err(e) => {
            log::warn!("Alignment failed, falling back to empty timings: {}", e);
            return SyncReport {
                lines: empty_results(lines),
                failure: Some(e),
                count_mismatch: None,
            };
        }
    };
    log::info!("Aligner returned {} tokens for {} lines", tokens.len(), lines.len());

    let (results, count_mismatch) = reconstruct_from_tokens(&tokens, lines, config.interpolate);

    SyncReport {
        lines: results,
        failure: None,
        count_mismatch,
    }
}

fn align_cached(
    aligner: &dyn Aligner,
    audio_path: &Path,
    text: &str,
    config: &SyncConfig,
    control: &RunControl,
) -> Result<Vec<TimedToken>, AlignError> {
    let key = if config.use_cache {
        match cache::file_hash(audio_path) {
            Ok(audio_hash) => Some(AlignmentKey {
                aligner: aligner.cache_id(),
                audio_hash,
                text_hash: cache::text_hash(text),
                model: config.model.clone(),
                language: config.language.clone(),
            }),
            Err(e) => {
                log::warn!("Alignment cache disabled for this run: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    if let Some(key) = &key {
        if let Some(tokens) = cache::get_cached_alignment(&config.cache_dir, key) {
            return Ok(tokens);
        }
    }

    let started = Instant::now();
    let tokens = aligner.align(audio_path, text, control)?;
    log::info!(
        "Aligned with '{}' in {:.1}s",
        aligner.name(),
        started.elapsed().as_secs_f64()
    );

    if let Some(key) = &key {
        if let Err(e) = cache::store_alignment_cache(&config.cache_dir, key, &tokens) {
            log::warn!("Failed to cache alignment: {:#}", e);
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LINE_SEPARATOR;
    use crate::language::align::StaticAligner;
    use crate::types::lines_from_texts;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingAligner;

    impl Aligner for FailingAligner {
        fn name(&self) -> &str {
            "failing"
        }

        fn align(&self, _: &Path, _: &str, _: &RunControl) -> Result<Vec<TimedToken>, AlignError> {
            Err(AlignError::Reported("decode failed".into()))
        }
    }

    struct CountingAligner {
        calls: AtomicUsize,
        tokens: Vec<TimedToken>,
    }

    impl Aligner for CountingAligner {
        fn name(&self) -> &str {
            "counting"
        }

        fn align(&self, _: &Path, _: &str, _: &RunControl) -> Result<Vec<TimedToken>, AlignError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens.clone())
        }
    }

    fn no_cache() -> SyncConfig {
        SyncConfig {
            use_cache: false,
            ..Default::default()
        }
    }

    fn tok(text: &str, start: f64) -> TimedToken {
        TimedToken::new(text, start, start)
    }

    #[test]
    fn test_reconstruct_well_formed() {
        let lines = lines_from_texts(&["술을 마시고", "노래해"]);
        let aligner = StaticAligner::new(vec![
            tok("술", 0.0),
            tok("을", 0.3),
            tok("마시고", 1.0),
            tok(LINE_SEPARATOR, 1.9),
            tok("노래해", 2.0),
        ]);
        let report = reconstruct(&aligner, Path::new("song.wav"), &lines, &no_cache(), &RunControl::default());

        assert!(report.is_aligned());
        assert!(report.count_mismatch.is_none());
        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.lines[0].refined_text, "술 을 마 시 고");
        // "마시고" spans to the next line's first mark at 2.0
        assert!((report.lines[0].timings[3].time_seconds - (1.0 + 1.0 / 3.0)).abs() < 1e-9);
        // Dangling final word gets one second
        assert_eq!(report.lines[1].refined_text, "노 래 해");
        assert!((report.lines[1].timings[2].time_seconds - (2.0 + 2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_reconstruct_without_interpolation() {
        let lines = lines_from_texts(&["마시고"]);
        let aligner = StaticAligner::new(vec![tok("마시고", 1.0)]);
        let config = SyncConfig {
            interpolate: false,
            ..no_cache()
        };
        let report = reconstruct(&aligner, Path::new("song.wav"), &lines, &config, &RunControl::default());
        assert_eq!(report.lines[0].refined_text, "마시고");
    }

    #[test]
    fn test_error_payload_yields_empty_results() {
        let lines = lines_from_texts(&["가", "나", "다"]);
        let report = reconstruct(&FailingAligner, Path::new("song.wav"), &lines, &no_cache(), &RunControl::default());

        assert!(!report.is_aligned());
        assert!(matches!(report.failure, Some(AlignError::Reported(_))));
        assert_eq!(report.lines.len(), 3);
        for (i, line) in report.lines.iter().enumerate() {
            assert_eq!(line.line_index, i);
            assert!(line.timings.is_empty());
            assert_eq!(line.refined_text, "");
        }
        assert_eq!(report.lines[1].original_text, "나");
    }

    #[test]
    fn test_count_mismatch_reported() {
        let lines = lines_from_texts(&["가", "나"]);
        let aligner = StaticAligner::new(vec![tok("가", 0.0), tok("나", 1.0)]);
        let report = reconstruct(&aligner, Path::new("song.wav"), &lines, &no_cache(), &RunControl::default());

        assert!(report.is_aligned());
        assert_eq!(report.count_mismatch, Some(CountMismatch { expected: 2, actual: 1 }));
        assert_eq!(report.lines.len(), 1);
    }

    #[test]
    fn test_empty_lines_skip_aligner() {
        let aligner = CountingAligner { calls: AtomicUsize::new(0), tokens: vec![] };
        let report = reconstruct(&aligner, Path::new("song.wav"), &[], &no_cache(), &RunControl::default());
        assert!(report.lines.is_empty());
        assert_eq!(aligner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_segmentation_count_for_n_lines() {
        let lines = lines_from_texts(&["가", "나", "다", "라"]);
        let mut tokens = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                tokens.push(tok(LINE_SEPARATOR, i as f64 - 0.1));
            }
            tokens.push(tok(&line.original_text, i as f64));
        }
        let (results, mismatch) = reconstruct_from_tokens(&tokens, &lines, true);
        assert_eq!(results.len(), 4);
        assert!(mismatch.is_none());
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.line_index, i);
        }
    }

    #[test]
    fn test_cache_reused_across_runs() {
        let dir = std::env::temp_dir().join(format!("lyricsync_pipeline_cache_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let audio = dir.join("song.wav");
        std::fs::write(&audio, b"fake audio").unwrap();

        let config = SyncConfig {
            cache_dir: dir.join("cache"),
            ..Default::default()
        };
        let lines = lines_from_texts(&["가"]);
        let aligner = CountingAligner {
            calls: AtomicUsize::new(0),
            tokens: vec![tok("가", 0.5)],
        };

        let first = reconstruct(&aligner, &audio, &lines, &config, &RunControl::default());
        let second = reconstruct(&aligner, &audio, &lines, &config, &RunControl::default());
        assert_eq!(aligner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.lines, second.lines);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_separates_aligner_commands() {
        use crate::language::align::SubprocessAligner;

        let dir = std::env::temp_dir().join(format!("lyricsync_pipeline_cmd_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let audio = dir.join("song.wav");
        std::fs::write(&audio, b"fake audio").unwrap();

        let config = SyncConfig {
            cache_dir: dir.join("cache"),
            interpolate: false,
            ..Default::default()
        };
        let lines = lines_from_texts(&["가"]);
        let echo = |word: &str| {
            let script = format!(r#"echo '[{{"word": "{}", "start": 0.5}}]'"#, word);
            SubprocessAligner::new("/bin/sh", &["-c".to_string(), script, "aligner".to_string()], "small", "ko")
        };

        let first = reconstruct(&echo("A"), &audio, &lines, &config, &RunControl::default());
        let second = reconstruct(&echo("B"), &audio, &lines, &config, &RunControl::default());
        assert_eq!(first.lines[0].refined_text, "A");
        assert_eq!(second.lines[0].refined_text, "B");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_untimed_words_do_not_fail_run() {
        let lines = lines_from_texts(&["가나"]);
        let tokens = crate::language::align::parse_payload(
            r#"[{"word": "가", "start": 0.0, "end": 0.2}, {"word": "나", "start": null, "end": null}]"#,
        )
        .unwrap();
        let aligner = StaticAligner::new(tokens);
        let report = reconstruct(&aligner, Path::new("song.wav"), &lines, &no_cache(), &RunControl::default());
        assert!(report.is_aligned());
        assert_eq!(report.lines[0].refined_text, "가");
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = std::env::temp_dir().join(format!("lyricsync_pipeline_fail_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let audio = dir.join("song.wav");
        std::fs::write(&audio, b"fake audio").unwrap();

        let config = SyncConfig {
            cache_dir: dir.join("cache"),
            ..Default::default()
        };
        let lines = lines_from_texts(&["가"]);
        let report = reconstruct(&FailingAligner, &audio, &lines, &config, &RunControl::default());
        assert!(!report.is_aligned());
        assert!(!dir.join("cache").join("align").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_control_from_config() {
        let config = SyncConfig {
            timeout_secs: Some(5),
            ..Default::default()
        };
        assert_eq!(config.run_control().timeout, Some(Duration::from_secs(5)));
        let unbounded = SyncConfig {
            timeout_secs: None,
            ..Default::default()
        };
        assert!(unbounded.run_control().timeout.is_none());
    }
}
