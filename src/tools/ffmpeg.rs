use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use super::{display_args, run_captured, run_stdout, ExtractRequest, FrameExtractor, FFMPEG_REMEDIATION};
use crate::errors::AppError;

const IMAGE_EXTENSION: &str = "png";

/// Frame extraction through `ffmpeg`, dimensions through `ffprobe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ffmpeg;

impl FrameExtractor for Ffmpeg {
    fn probe_dimensions(&self, source: &Path) -> Result<(u32, u32)> {
        let mut command = Command::new("ffprobe");
        command
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height", "-of", "csv=s=x:p=0"])
            .arg(source);
        let stdout = run_stdout(&mut command, "ffprobe", FFMPEG_REMEDIATION)?;
        parse_dimensions(&stdout).ok_or_else(|| {
            AppError::tool_failed(
                "ffprobe",
                format!("could not read video dimensions of {}: got '{}'", source.display(), stdout.trim()),
            )
            .into()
        })
    }

    fn extract_frames(&self, request: &ExtractRequest<'_>) -> Result<Vec<PathBuf>> {
        let args = extract_args(request);
        debug!(args = %display_args(&args), "extracting frames");
        let mut command = Command::new("ffmpeg");
        command.args(&args);
        run_captured(&mut command, "ffmpeg", FFMPEG_REMEDIATION)?;

        let images = list_images(request.staging_dir)?;
        if images.is_empty() {
            return Err(AppError::tool_failed(
                "ffmpeg",
                format!("no frames were extracted from {}", request.source.display()),
            )
            .into());
        }
        Ok(images)
    }
}

/// `fps=<r>,format=rgba` plus an optional `chromakey` stage.
pub fn video_filter(framerate: u32, chroma: Option<&str>) -> String {
    let mut filter = format!("fps={framerate},format=rgba");
    if let Some(chroma) = chroma {
        filter.push_str(",chromakey=");
        filter.push_str(chroma);
    }
    filter
}

pub fn extract_args(request: &ExtractRequest<'_>) -> Vec<OsString> {
    let pattern = request.staging_dir.join(format!("%05d.{IMAGE_EXTENSION}"));
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        request.source.as_os_str().to_owned(),
        "-vf".into(),
        video_filter(request.framerate, request.chroma).into(),
        "-q:v".into(),
        request.quality.clamp(2, 10).to_string().into(),
        pattern.into_os_string(),
    ]
}

fn parse_dimensions(raw: &str) -> Option<(u32, u32)> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let (width, height) = line.split_once('x')?;
    let width = width.trim().parse().ok()?;
    let height = height.trim().trim_end_matches('x').parse().ok()?;
    Some((width, height))
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read staging dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if path.extension().is_some_and(|ext| ext == IMAGE_EXTENSION) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
