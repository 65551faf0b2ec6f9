use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const DEFAULT_WIDTH: u32 = 40;
pub const DEFAULT_TOP: u16 = 2;
pub const DEFAULT_FRAMERATE: u32 = 10;
pub const DEFAULT_PLAYBACK_RATE: f64 = 10.0;
pub const DEFAULT_QUALITY: u8 = 6;
pub const DEFAULT_RENDER_ARGS: &[&str] = &["--symbols", "ascii", "--fg-only"];

/// Keys of [`Config`] that never influence the rendered frames.
pub const COSMETIC_FIELDS: &[&str] = &["playback_rate", "verbose", "benchmark", "force_render"];

/// How many times the animation is played. Serialized as `-1` for infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum LoopCount {
    Infinite,
    Times(u32),
}

impl From<LoopCount> for i64 {
    fn from(value: LoopCount) -> Self {
        match value {
            LoopCount::Infinite => -1,
            LoopCount::Times(n) => i64::from(n),
        }
    }
}

impl TryFrom<i64> for LoopCount {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Ok(Self::Infinite);
        }
        u32::try_from(value)
            .map(Self::Times)
            .map_err(|_| format!("loop count {value} is too large"))
    }
}

/// Info-panel refresh cadence. Serialized as seconds, `-1` for never.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "f64", from = "f64")]
pub enum RefreshInterval {
    Never,
    Every(Duration),
}

impl From<RefreshInterval> for f64 {
    fn from(value: RefreshInterval) -> Self {
        match value {
            RefreshInterval::Never => -1.0,
            RefreshInterval::Every(interval) => interval.as_secs_f64(),
        }
    }
}

impl From<f64> for RefreshInterval {
    fn from(seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            Self::Every(Duration::from_secs_f64(seconds))
        } else {
            Self::Never
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "path", rename_all = "snake_case")]
pub enum SoundSpec {
    Off,
    /// Pull the audio stream out of the source video.
    FromSource,
    File(PathBuf),
}

/// Every recognized option of one run. Built once from the command line and
/// never changed afterwards; [`Config::with_source`] returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub source: Option<PathBuf>,
    pub width: u32,
    /// `None` means "infer from the source aspect ratio".
    pub height: Option<u32>,
    pub top: u16,
    pub framerate: u32,
    pub playback_rate: f64,
    pub quality: u8,
    pub render_args: Vec<String>,
    pub center: bool,
    pub loop_count: LoopCount,
    pub interval: RefreshInterval,
    pub chroma: Option<String>,
    pub sound: SoundSpec,
    pub neofetch: bool,
    pub force_neofetch: bool,
    pub cleanup: bool,
    pub no_key_exit: bool,
    pub verbose: bool,
    pub benchmark: bool,
    pub force_render: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            width: DEFAULT_WIDTH,
            height: None,
            top: DEFAULT_TOP,
            framerate: DEFAULT_FRAMERATE,
            playback_rate: DEFAULT_PLAYBACK_RATE,
            quality: DEFAULT_QUALITY,
            render_args: DEFAULT_RENDER_ARGS.iter().map(|arg| (*arg).to_owned()).collect(),
            center: false,
            loop_count: LoopCount::Infinite,
            interval: RefreshInterval::Never,
            chroma: None,
            sound: SoundSpec::Off,
            neofetch: false,
            force_neofetch: false,
            cleanup: false,
            no_key_exit: false,
            verbose: false,
            benchmark: false,
            force_render: false,
        }
    }
}

impl Config {
    pub fn with_source(self, source: PathBuf) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(AppError::config("E_WIDTH", "--width must be at least 1").into());
        }
        if self.height == Some(0) {
            return Err(AppError::config("E_HEIGHT", "--height must be at least 1").into());
        }
        if self.framerate == 0 {
            return Err(AppError::config("E_FRAMERATE", "--framerate must be at least 1").into());
        }
        if !(self.playback_rate.is_finite() && self.playback_rate > 0.0) {
            return Err(AppError::config(
                "E_PLAYBACK_RATE",
                format!("--playback-rate must be positive, got {}", self.playback_rate),
            )
            .into());
        }
        if let Some(chroma) = self.chroma.as_deref() {
            validate_chroma(chroma)?;
        }
        if let SoundSpec::File(file) = &self.sound {
            if !file.is_file() {
                return Err(AppError::missing_input(format!(
                    "Sound file not found: {}",
                    file.display()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// ffmpeg quality scale: 2-5 high quality, 6-10 lower.
    pub fn clamped_quality(&self) -> u8 {
        self.quality.clamp(2, 10)
    }

    /// Frames per second used for playback. A sound track pins playback to
    /// the extraction framerate so audio and animation start in step.
    pub fn playback_fps(&self, has_sound: bool) -> f64 {
        if has_sound {
            f64::from(self.framerate)
        } else {
            self.playback_rate
        }
    }
}

fn chroma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^0x[0-9A-Fa-f]{6}(:[0-9]*\.?[0-9]+){0,2}$").expect("chroma pattern is valid")
    })
}

/// Accepts `0xRRGGBB[:similarity[:blend]]`, the syntax ffmpeg's
/// `chromakey` filter expects.
pub fn validate_chroma(raw: &str) -> Result<()> {
    if raw.starts_with('#') {
        return Err(AppError::config(
            "E_CHROMA_PREFIX",
            "Use '0x' prefix for chroma color, not '#'.",
        )
        .into());
    }
    if !chroma_pattern().is_match(raw) {
        return Err(AppError::config(
            "E_CHROMA_FORMAT",
            format!(
                "invalid chroma '{raw}': expected <0xRRGGBB>:<similarity>:<blend>, e.g. 0xc82044:0.1:0.1"
            ),
        )
        .into());
    }
    Ok(())
}
