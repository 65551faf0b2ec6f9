//! External collaborators: frame extraction, text-art rendering, info text
//! and audio. Each is a trait so the cache engine and the scheduler can run
//! against fakes; the `system` implementations shell out to ffmpeg, chafa,
//! fastfetch/neofetch and ffplay.

pub mod audio;
pub mod chafa;
pub mod fetch;
pub mod ffmpeg;

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::config::Config;
use crate::errors::AppError;

pub const FFMPEG_REMEDIATION: &str =
    "You probably forgot to install it. You can install it from https://ffmpeg.org/download.html";
pub const CHAFA_REMEDIATION: &str =
    "You probably forgot to install it. You can install it from https://hpjansson.org/chafa/download/";

#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub source: &'a Path,
    pub framerate: u32,
    /// Already clamped to ffmpeg's 2..=10 scale.
    pub quality: u8,
    pub chroma: Option<&'a str>,
    pub staging_dir: &'a Path,
}

pub trait FrameExtractor: Send + Sync {
    /// Pixel width and height of the first video stream.
    fn probe_dimensions(&self, source: &Path) -> Result<(u32, u32)>;

    /// Write numbered images into `staging_dir` and return them in order.
    fn extract_frames(&self, request: &ExtractRequest<'_>) -> Result<Vec<PathBuf>>;
}

pub trait FrameRenderer: Send + Sync {
    fn render(&self, image: &Path, width: u32, height: u32, style_args: &[String]) -> Result<String>;
}

pub trait InfoSource: Send + Sync {
    fn info_lines(&self) -> Result<Vec<String>>;
}

pub trait AudioTools: Send + Sync {
    /// Pull the audio stream of `source` into `dest_dir` without re-encoding.
    fn extract_audio(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf>;

    /// Start looping playback in the background.
    fn play(&self, artifact: &Path) -> Result<Box<dyn AudioHandle>>;
}

pub trait AudioHandle: Send {
    fn terminate(&mut self) -> Result<()>;
}

/// The full set of collaborators for one run.
#[derive(Clone)]
pub struct Toolbox {
    pub extractor: Arc<dyn FrameExtractor>,
    pub renderer: Arc<dyn FrameRenderer>,
    pub info: Arc<dyn InfoSource>,
    pub audio: Arc<dyn AudioTools>,
}

impl Toolbox {
    /// Collaborators backed by the real executables. Picking the info
    /// provider may probe `neofetch --version`.
    pub fn system(config: &Config) -> Result<Self> {
        Ok(Self {
            extractor: Arc::new(ffmpeg::Ffmpeg),
            renderer: Arc::new(chafa::Chafa),
            info: fetch::select_info_source(config.neofetch, config.force_neofetch)?,
            audio: Arc::new(audio::FfmpegAudio),
        })
    }
}

/// Spawn `command` and wait for it, capturing both streams.
///
/// A missing binary becomes a `ToolNotFound` error naming `tool`; a non-zero
/// exit becomes `ToolFailed` carrying stderr.
pub(crate) fn run_captured(command: &mut Command, tool: &str, remediation: &str) -> Result<Output> {
    debug!(tool, command = ?command, "running collaborator");
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|error| spawn_error(error, tool, remediation))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::tool_failed(
            tool,
            format!("{} ({})", stderr.trim(), output.status),
        )
        .into());
    }
    Ok(output)
}

/// Like [`run_captured`] but returns stdout as text.
pub(crate) fn run_stdout(command: &mut Command, tool: &str, remediation: &str) -> Result<String> {
    let output = run_captured(command, tool, remediation)?;
    String::from_utf8(output.stdout).map_err(|_| AppError::tool_failed(tool, "output is not valid UTF-8").into())
}

pub(crate) fn spawn_error(error: std::io::Error, tool: &str, remediation: &str) -> anyhow::Error {
    if error.kind() == ErrorKind::NotFound {
        AppError::tool_not_found(tool, remediation).into()
    } else {
        anyhow!("failed to spawn {tool}: {error}")
    }
}

pub(crate) fn display_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter()
        .map(|arg| arg.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
