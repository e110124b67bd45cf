//! Resolve the reference audio for a run: a local file, or a remote URL
//! downloaded into a temporary file that lives as long as the run.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Audio handed to the aligner.
///
/// A remote source owns its temporary file; dropping it deletes the file.
pub enum AudioSource {
    Local(PathBuf),
    #[cfg(feature = "remote-audio")]
    Remote(tempfile::NamedTempFile),
}

impl AudioSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            #[cfg(feature = "remote-audio")]
            Self::Remote(file) => file.path(),
        }
    }
}

/// True if `location` is an http(s) URL.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolve `location` to a readable audio file.
pub fn resolve_audio(location: &str, timeout_secs: u64) -> Result<AudioSource> {
    if is_remote(location) {
        #[cfg(feature = "remote-audio")]
        {
            return Ok(AudioSource::Remote(fetch_audio(location, timeout_secs)?));
        }

        #[cfg(not(feature = "remote-audio"))]
        {
            let _ = timeout_secs;
            bail!(
                "Remote audio requires the 'remote-audio' feature. \
                 Build with: cargo build --features remote-audio"
            );
        }
    }

    let path = PathBuf::from(location);
    if !path.is_file() {
        bail!("Audio file not found: {}", path.display());
    }
    Ok(AudioSource::Local(path))
}

/// Download `url` into a fresh temporary file.
#[cfg(feature = "remote-audio")]
pub fn fetch_audio(url: &str, timeout_secs: u64) -> Result<tempfile::NamedTempFile> {
    use std::io::{Read, Write};

    use anyhow::Context;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    log::info!("Downloading audio {} ...", url);

    let mut response = client.get(url).send().context("Failed to download audio")?;

    if !response.status().is_success() {
        bail!("Download failed: HTTP {} for {}", response.status(), url);
    }

    let total_size = response.content_length();
    let suffix = audio_suffix(url);
    let mut tmp_file = tempfile::Builder::new()
        .prefix("lyricsync-audio-")
        .suffix(&suffix)
        .tempfile()
        .context("Failed to create temp file")?;

    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = response.read(&mut buf).context("Error reading download")?;
        if n == 0 {
            break;
        }
        tmp_file.write_all(&buf[..n]).context("Error writing audio")?;
        downloaded += n as u64;
    }

    if let Some(expected) = total_size {
        if downloaded != expected {
            bail!(
                "Incomplete download: got {} bytes, expected {}",
                downloaded,
                expected
            );
        }
    }
    if downloaded == 0 {
        bail!("Downloaded audio is empty: {}", url);
    }
    tmp_file.flush()?;

    log::info!(
        "Audio saved to {} ({:.1} MB)",
        tmp_file.path().display(),
        downloaded as f64 / 1_048_576.0
    );
    Ok(tmp_file)
}

/// File extension (with dot) from the URL path, so the aligner can sniff
/// the container. Defaults to `.mp3`.
#[cfg_attr(not(feature = "remote-audio"), allow(dead_code))]
fn audio_suffix(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => ".mp3".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://cdn.example.com/a.mp3"));
        assert!(is_remote("http://host/a.wav"));
        assert!(!is_remote("/tmp/a.mp3"));
        assert!(!is_remote("ftp://host/a.mp3"));
    }

    #[test]
    fn test_audio_suffix() {
        assert_eq!(audio_suffix("https://x.com/songs/track.WAV?sig=1"), ".wav");
        assert_eq!(audio_suffix("https://x.com/songs/track.m4a#t=3"), ".m4a");
        assert_eq!(audio_suffix("https://x.com/stream"), ".mp3");
        assert_eq!(audio_suffix("https://x.com/songs/.hidden"), ".mp3");
    }

    #[test]
    fn test_resolve_local_file() {
        let dir = std::env::temp_dir().join(format!("lyricsync_audio_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("song.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let source = resolve_audio(path.to_str().unwrap(), 10).unwrap();
        assert_eq!(source.path(), path.as_path());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_missing_file() {
        assert!(resolve_audio("/nonexistent/lyricsync/song.wav", 10).is_err());
    }
}
