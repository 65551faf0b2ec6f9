use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{run_captured, run_stdout, spawn_error, AudioHandle, AudioTools, FFMPEG_REMEDIATION};
use crate::errors::AppError;

pub const AUDIO_FILE_STEM: &str = "output_audio";

/// File extension that holds `codec` without re-encoding.
pub fn codec_extension(codec: &str) -> Option<&'static str> {
    match codec.trim().to_ascii_lowercase().as_str() {
        "aac" | "alac" => Some("m4a"),
        "mp3" => Some("mp3"),
        "opus" => Some("opus"),
        "vorbis" => Some("ogg"),
        "pcm_s16le" => Some("wav"),
        "flac" => Some("flac"),
        _ => None,
    }
}

/// Audio file name inside a cache directory, keeping the source extension.
pub fn cached_audio_name(source: &Path) -> String {
    match source.extension() {
        Some(ext) => format!("{AUDIO_FILE_STEM}.{}", ext.to_string_lossy()),
        None => AUDIO_FILE_STEM.to_owned(),
    }
}

/// Extraction with `ffprobe`/`ffmpeg`, playback with `ffplay`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegAudio;

impl FfmpegAudio {
    fn probe_codec(&self, source: &Path) -> Result<String> {
        let mut command = Command::new("ffprobe");
        command
            .args(["-v", "error", "-select_streams", "a:0"])
            .args(["-show_entries", "stream=codec_name"])
            .args(["-of", "default=nokey=1:noprint_wrappers=1"])
            .arg(source);
        Ok(run_stdout(&mut command, "ffprobe", FFMPEG_REMEDIATION)?.trim().to_owned())
    }
}

impl AudioTools for FfmpegAudio {
    fn extract_audio(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let codec = self.probe_codec(source)?;
        let Some(extension) = codec_extension(&codec) else {
            return Err(AppError::tool_failed(
                "ffprobe",
                format!("unsupported or unknown audio codec '{codec}' in {}", source.display()),
            )
            .into());
        };
        let destination = dest_dir.join(format!("{AUDIO_FILE_STEM}.{extension}"));
        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(source)
            .args(["-y", "-vn", "-c:a", "copy"])
            .arg(&destination);
        run_captured(&mut command, "ffmpeg", FFMPEG_REMEDIATION)?;
        debug!(codec = %codec, path = %destination.display(), "extracted audio");
        Ok(destination)
    }

    fn play(&self, artifact: &Path) -> Result<Box<dyn AudioHandle>> {
        let child = Command::new("ffplay")
            .args(["-nodisp", "-autoexit", "-loop", "0", "-loglevel", "quiet"])
            .arg(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| spawn_error(error, "ffplay", FFMPEG_REMEDIATION))?;
        debug!(pid = child.id(), "started audio playback");
        Ok(Box::new(FfplayHandle { child: Some(child) }))
    }
}

/// Running `ffplay`. Killed on [`AudioHandle::terminate`] or drop.
#[derive(Debug)]
pub struct FfplayHandle {
    child: Option<Child>,
}

impl AudioHandle for FfplayHandle {
    fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait().context("failed to poll ffplay")?.is_none() {
            child.kill().context("failed to stop ffplay")?;
        }
        child.wait().context("failed to reap ffplay")?;
        Ok(())
    }
}

impl Drop for FfplayHandle {
    fn drop(&mut self) {
        if let Err(error) = self.terminate() {
            warn!(%error, "audio player did not shut down cleanly");
        }
    }
}
