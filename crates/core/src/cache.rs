//! File-based caching of aligner output.
//!
//! Forced alignment is the slow step of a run. Its word list is cached
//! keyed by the audio's SHA-256, the flattened lyric text, the backend,
//! and the model/language it ran with.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::types::{TimedToken, WordTimestamp};

/// Get the cache directory.
///
/// Uses `LYRICSYNC_CACHE_DIR` env var if set, otherwise `~/.cache/lyricsync`.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LYRICSYNC_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cache").join("lyricsync")
}

/// Compute SHA-256 hash of a file's contents.
///
/// Returns a 64-character hex string.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a string, hex encoded.
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Atomically write data to a file via temp file + rename.
fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = target.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, target)?;
    Ok(())
}

/// Identity of one aligner invocation.
#[derive(Debug, Clone)]
pub struct AlignmentKey {
    pub aligner: String,
    pub audio_hash: String,
    pub text_hash: String,
    pub model: String,
    pub language: String,
}

impl AlignmentKey {
    fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.json",
            self.aligner,
            self.audio_hash,
            &self.text_hash[..16.min(self.text_hash.len())],
            self.model,
            self.language
        )
    }

    fn short(&self) -> &str {
        &self.audio_hash[..12.min(self.audio_hash.len())]
    }
}

/// Return cached aligner output, or None if not cached.
///
/// Unreadable or corrupt entries count as misses.
pub fn get_cached_alignment(root: &Path, key: &AlignmentKey) -> Option<Vec<TimedToken>> {
    let path = root.join("align").join(key.file_name());
    if !path.exists() {
        return None;
    }
    let data = std::fs::read_to_string(&path).ok()?;
    let words: Vec<WordTimestamp> = match serde_json::from_str(&data) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
            return None;
        }
    };
    log::info!("Cache hit: alignment ({}...)", key.short());
    Some(words.into_iter().filter_map(WordTimestamp::into_token).collect())
}

/// Store aligner output in the cache.
pub fn store_alignment_cache(root: &Path, key: &AlignmentKey, tokens: &[TimedToken]) -> Result<()> {
    let path = root.join("align").join(key.file_name());
    let words: Vec<WordTimestamp> = tokens.iter().map(WordTimestamp::from).collect();
    let json = serde_json::to_string(&words)?;
    atomic_write(&path, json.as_bytes())
        .with_context(|| format!("Failed to write cache entry: {}", path.display()))?;
    log::info!("Cached alignment ({}...)", key.short());
    Ok(())
}
