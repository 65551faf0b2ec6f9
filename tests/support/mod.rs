#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use anifetch::scheduler::Clock;
use anifetch::terminal::{KeyPress, Screen};
use anifetch::tools::{
    AudioHandle, AudioTools, ExtractRequest, FrameExtractor, FrameRenderer, InfoSource, Toolbox,
};

/// Writes `frames` numbered PNG placeholders into the staging dir.
pub struct FakeExtractor {
    pub frames: usize,
    pub dimensions: (u32, u32),
    pub calls: AtomicUsize,
    pub probes: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            dimensions: (1920, 1080),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }
}

impl FrameExtractor for FakeExtractor {
    fn probe_dimensions(&self, _source: &Path) -> Result<(u32, u32)> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.dimensions)
    }

    fn extract_frames(&self, request: &ExtractRequest<'_>) -> Result<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (1..=self.frames)
            .map(|n| -> Result<PathBuf> {
                let path = request.staging_dir.join(format!("{n:05}.png"));
                fs::write(&path, format!("image {n}"))?;
                Ok(path)
            })
            .collect()
    }
}

/// Renders `height` rows of the image's contents, truncated to `width`.
#[derive(Default)]
pub struct FakeRenderer {
    pub calls: AtomicUsize,
    pub fail_on: Option<String>,
}

impl FrameRenderer for FakeRenderer {
    fn render(&self, image: &Path, width: u32, height: u32, _style_args: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = fs::read_to_string(image)?;
        if self.fail_on.as_deref() == Some(content.as_str()) {
            bail!("renderer exploded on {content}");
        }
        let row = content.chars().cycle().take(width as usize).collect::<String>();
        Ok((0..height).map(|_| format!("{row}\n")).collect())
    }
}

pub struct FakeInfo {
    pub lines: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeInfo {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| (*line).to_owned()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl InfoSource for FakeInfo {
    fn info_lines(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lines.clone())
    }
}

#[derive(Default)]
pub struct FakeAudio {
    pub extractions: AtomicUsize,
    pub started: Arc<AtomicUsize>,
    pub terminated: Arc<AtomicUsize>,
}

struct FakeAudioHandle {
    terminated: Arc<AtomicUsize>,
}

impl AudioHandle for FakeAudioHandle {
    fn terminate(&mut self) -> Result<()> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioTools for FakeAudio {
    fn extract_audio(&self, _source: &Path, dest_dir: &Path) -> Result<PathBuf> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let path = dest_dir.join("output_audio.m4a");
        fs::write(&path, b"audio")?;
        Ok(path)
    }

    fn play(&self, _artifact: &Path) -> Result<Box<dyn AudioHandle>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAudioHandle {
            terminated: self.terminated.clone(),
        }))
    }
}

pub struct Fakes {
    pub extractor: Arc<FakeExtractor>,
    pub renderer: Arc<FakeRenderer>,
    pub info: Arc<FakeInfo>,
    pub audio: Arc<FakeAudio>,
}

impl Fakes {
    pub fn new(frames: usize) -> Self {
        Self {
            extractor: Arc::new(FakeExtractor::new(frames)),
            renderer: Arc::new(FakeRenderer::default()),
            info: Arc::new(FakeInfo::new(&["OS: Test", "Host: fake"])),
            audio: Arc::new(FakeAudio::default()),
        }
    }

    pub fn toolbox(&self) -> Toolbox {
        Toolbox {
            extractor: self.extractor.clone(),
            renderer: self.renderer.clone(),
            info: self.info.clone(),
            audio: self.audio.clone(),
        }
    }
}

/// Records every write; keys are handed out one per poll.
pub struct FakeScreen {
    pub size: (u16, u16),
    /// Switch to the given size once `size()` has been called this many times.
    pub resize: Option<(usize, (u16, u16))>,
    pub size_calls: usize,
    pub writes: Vec<Vec<u8>>,
    pub keys: VecDeque<Option<KeyPress>>,
    pub polls: usize,
    pub restored: usize,
}

impl FakeScreen {
    pub fn new(size: (u16, u16)) -> Self {
        Self {
            size,
            resize: None,
            size_calls: 0,
            writes: Vec::new(),
            keys: VecDeque::new(),
            polls: 0,
            restored: 0,
        }
    }

    /// No key for `quiet` polls, then `key`.
    pub fn key_after(mut self, quiet: usize, key: KeyPress) -> Self {
        self.keys.extend(std::iter::repeat(None).take(quiet));
        self.keys.push_back(Some(key));
        self
    }

    pub fn resized_after(mut self, calls: usize, size: (u16, u16)) -> Self {
        self.resize = Some((calls, size));
        self
    }

    pub fn text(&self) -> String {
        self.writes
            .iter()
            .map(|write| String::from_utf8_lossy(write).into_owned())
            .collect()
    }
}

impl Screen for FakeScreen {
    fn size(&mut self) -> Result<(u16, u16)> {
        if let Some((after, size)) = self.resize {
            if self.size_calls >= after {
                self.size = size;
            }
        }
        self.size_calls += 1;
        Ok(self.size)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<KeyPress>> {
        self.polls += 1;
        Ok(self.keys.pop_front().flatten())
    }

    fn restore(&mut self) -> Result<()> {
        self.restored += 1;
        Ok(())
    }
}

/// Advances only when slept on.
#[derive(Default)]
pub struct ManualClock {
    pub now: Duration,
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}
