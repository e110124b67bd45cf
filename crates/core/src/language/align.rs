//! Aligner interface and backends.
//!
//! The forced aligner is an external tool: it receives an audio path and
//! the flattened lyric text and answers with a JSON word list
//! `[{"word", "start", "end"}, ...]`, or `{"error": "..."}` on failure.
//! - SubprocessAligner: runs the tool as a child process, time-boxed
//! - StaticAligner / ReplayAligner: replay a saved word list

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AlignError;
use crate::types::{TimedToken, WordTimestamp};

use super::tokenize::LINE_SEPARATOR;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Max characters of stderr kept in a process failure.
const STDERR_TAIL_CHARS: usize = 2000;

/// Deadline and cancellation for one aligner call.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// Maximum wall time for the call (None = unbounded)
    pub timeout: Option<Duration>,
    /// Set to true from another thread to abort the call
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunControl {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }

    pub fn with_cancel_token(token: Arc<AtomicBool>) -> Self {
        Self {
            cancel: Some(token),
            ..Default::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|t| t.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn is_timed_out(&self, start: Instant) -> bool {
        self.timeout.map(|t| start.elapsed() >= t).unwrap_or(false)
    }
}

/// Alignment backend trait.
pub trait Aligner: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Identity used in cache keys. Backends whose output depends on more
    /// than their name must fold that configuration in here.
    fn cache_id(&self) -> String {
        self.name().to_string()
    }

    /// Align `text` against the audio, returning timed tokens in order.
    fn align(
        &self,
        audio_path: &Path,
        text: &str,
        control: &RunControl,
    ) -> std::result::Result<Vec<TimedToken>, AlignError>;
}

/// External aligner run as `<program> <args...> <audio_path> <text>`.
///
/// Model and language are passed to the child through `LYRICSYNC_MODEL`
/// and `LYRICSYNC_LANGUAGE`.
pub struct SubprocessAligner {
    pub program: String,
    pub args: Vec<String>,
    pub model: String,
    pub language: String,
}

impl SubprocessAligner {
    pub fn new(program: &str, args: &[String], model: &str, language: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            model: model.to_string(),
            language: language.to_string(),
        }
    }

    fn command(&self, audio_path: &Path, text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(audio_path)
            .arg(text)
            .env("LYRICSYNC_MODEL", &self.model)
            .env("LYRICSYNC_LANGUAGE", &self.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Aligner for SubprocessAligner {
    fn name(&self) -> &str {
        "subprocess"
    }

    /// `subprocess-<hash of program and args>`
    fn cache_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.program.as_bytes());
        for arg in &self.args {
            hasher.update([0u8]);
            hasher.update(arg.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}", self.name(), &digest[..16])
    }

    fn align(
        &self,
        audio_path: &Path,
        text: &str,
        control: &RunControl,
    ) -> std::result::Result<Vec<TimedToken>, AlignError> {
        if control.is_cancelled() {
            return Err(AlignError::Cancelled);
        }

        log::info!(
            "Running aligner: {} {} ({} chars of text)",
            self.program,
            audio_path.display(),
            text.chars().count()
        );
        let started = Instant::now();
        let output = run_controlled(self.command(audio_path, text), &self.program, control)?;
        log::debug!("Aligner finished in {:.2}s", started.elapsed().as_secs_f64());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            if let Some(message) = find_error_payload(&stderr).or_else(|| find_error_payload(&stdout)) {
                return Err(AlignError::Reported(message));
            }
            return Err(AlignError::ProcessFailed {
                status: output.status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL_CHARS),
            });
        }

        parse_payload(&stdout)
    }
}

/// Replays a saved aligner payload instead of running the aligner.
pub struct StaticAligner {
    tokens: Vec<TimedToken>,
}

impl StaticAligner {
    pub fn new(tokens: Vec<TimedToken>) -> Self {
        Self { tokens }
    }
}

impl Aligner for StaticAligner {
    fn name(&self) -> &str {
        "replay"
    }

    fn align(
        &self,
        _audio_path: &Path,
        _text: &str,
        control: &RunControl,
    ) -> std::result::Result<Vec<TimedToken>, AlignError> {
        if control.is_cancelled() {
            return Err(AlignError::Cancelled);
        }
        Ok(self.tokens.clone())
    }
}

/// A loaded payload file: either word timings or a recorded error.
pub enum ReplayAligner {
    Tokens(StaticAligner),
    Failure(String),
}

impl ReplayAligner {
    /// Load a payload file. An `{"error"}` payload is kept and replayed as
    /// a run failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alignment file: {}", path.display()))?;
        Ok(match parse_payload(&data) {
            Ok(tokens) => Self::Tokens(StaticAligner::new(tokens)),
            Err(AlignError::Reported(message)) => Self::Failure(message),
            Err(e) => {
                return Err(e).with_context(|| format!("Invalid alignment file: {}", path.display()));
            }
        })
    }
}

impl Aligner for ReplayAligner {
    fn name(&self) -> &str {
        "replay"
    }

    fn align(
        &self,
        audio_path: &Path,
        text: &str,
        control: &RunControl,
    ) -> std::result::Result<Vec<TimedToken>, AlignError> {
        match self {
            Self::Tokens(inner) => inner.align(audio_path, text, control),
            Self::Failure(message) => Err(AlignError::Reported(message.clone())),
        }
    }
}

/// Parse the aligner's stdout into timed tokens.
///
/// Accepts the whole text as JSON, or failing that its last line that
/// looks like JSON (the tool may print progress before the payload).
///
/// Items without a `word` make the payload malformed. Items whose start
/// time is missing or not numeric are dropped with a warning, except
/// separators, which keep the previous token's start so line boundaries
/// survive. Negative and out-of-order times pass through untouched.
pub fn parse_payload(payload: &str) -> std::result::Result<Vec<TimedToken>, AlignError> {
    let value = match serde_json::from_str::<Value>(payload.trim()) {
        Ok(v) => v,
        Err(full_err) => last_json_line(payload).ok_or_else(|| AlignError::malformed(full_err))?,
    };

    match value {
        Value::Array(items) => {
            let mut tokens: Vec<TimedToken> = Vec::with_capacity(items.len());
            let mut dropped = 0usize;
            for item in items {
                let word: WordTimestamp =
                    serde_json::from_value(item).map_err(AlignError::malformed)?;
                let is_separator = word.word.trim() == LINE_SEPARATOR;
                match word.into_token() {
                    Some(token) => tokens.push(token),
                    None if is_separator => {
                        let start = tokens.last().map(|t| t.start).unwrap_or(0.0);
                        tokens.push(TimedToken::new(LINE_SEPARATOR, start, start));
                    }
                    None => dropped += 1,
                }
            }
            if dropped > 0 {
                log::warn!("Dropped {} aligner word(s) without a usable start time", dropped);
            }
            Ok(tokens)
        }
        Value::Object(map) => match map.get("error") {
            Some(err) => Err(AlignError::Reported(error_text(err))),
            None => Err(AlignError::malformed("expected a JSON array, got an object")),
        },
        other => Err(AlignError::malformed(format!(
            "expected a JSON array, got {}",
            other
        ))),
    }
}

/// Look for an `{"error": ...}` object among the lines of `text`.
fn find_error_payload(text: &str) -> Option<String> {
    text.lines().rev().find_map(|line| {
        match serde_json::from_str::<Value>(line.trim()).ok()? {
            Value::Object(map) => map.get("error").map(error_text),
            _ => None,
        }
    })
}

fn last_json_line(text: &str) -> Option<Value> {
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('[') || l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

fn error_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Run `cmd` to completion unless the deadline passes or the run is
/// cancelled, in which case the child is killed and reaped.
fn run_controlled(
    mut cmd: Command,
    program: &str,
    control: &RunControl,
) -> std::result::Result<ProcessOutput, AlignError> {
    let mut child = cmd.spawn().map_err(|source| AlignError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                let abort = if control.is_cancelled() {
                    Some(AlignError::Cancelled)
                } else if control.is_timed_out(start) {
                    Some(AlignError::Timeout(control.timeout.unwrap_or_default()))
                } else {
                    None
                };
                if let Some(err) = abort {
                    log::warn!("Stopping aligner process {}: {}", child.id(), err);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(err);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AlignError::io("waiting for aligner", e));
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: join_reader(stdout_reader)?,
        stderr: join_reader(stderr_reader)?,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(
    handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
) -> std::result::Result<Vec<u8>, AlignError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    handle
        .join()
        .map_err(|_| {
            AlignError::io(
                "reading aligner output",
                std::io::Error::new(std::io::ErrorKind::Other, "reader thread panicked"),
            )
        })?
        .map_err(|e| AlignError::io("reading aligner output", e))
}

/// Get an aligner backend by name.
///
/// Backends:
/// - "subprocess" — `command[0]` is the program, the rest its leading args.
/// - "replay" — `command[0]` is a saved payload file.
pub fn get_aligner(
    name: &str,
    command: &[String],
    model: &str,
    language: &str,
) -> Result<Box<dyn Aligner>> {
    match name {
        "subprocess" => {
            let Some((program, args)) = command.split_first() else {
                bail!("The subprocess aligner needs a program to run");
            };
            Ok(Box::new(SubprocessAligner::new(program, args, model, language)))
        }
        "replay" => {
            let Some(path) = command.first() else {
                bail!("The replay aligner needs a payload file");
            };
            Ok(Box::new(ReplayAligner::from_file(&PathBuf::from(path))?))
        }
        _ => bail!("Unknown aligner: '{}'. Available: subprocess, replay", name),
    }
}
