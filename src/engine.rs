//! Cache-or-generate: turns a validated [`Config`] into frames ready to play.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cache::{frame_file_name, list_frame_files, CacheDecision, CacheEntry, CacheStore, Generation};
use crate::config::{Config, SoundSpec};
use crate::errors::AppError;
use crate::fingerprint::{fingerprint_config, Fingerprint};
use crate::frames::{frame_height, FrameStore};
use crate::layout::infer_height;
use crate::tools::audio::cached_audio_name;
use crate::tools::{ExtractRequest, Toolbox};

/// Frames and metadata for one playback session.
#[derive(Debug)]
pub struct PreparedAnimation {
    pub fingerprint: Fingerprint,
    pub frames: FrameStore,
    /// Columns reserved for the animation.
    pub width: usize,
    /// Rows of the first frame.
    pub height: usize,
    pub sound: Option<PathBuf>,
    pub from_cache: bool,
}

/// Look the configuration up in the cache, regenerating on a miss.
///
/// `progress` receives short user-facing status lines.
pub fn prepare(
    config: &Config,
    store: &CacheStore,
    tools: &Toolbox,
    progress: &mut dyn FnMut(&str),
) -> Result<PreparedAnimation> {
    let source = config
        .source
        .as_deref()
        .ok_or_else(|| AppError::missing_input("no input file given"))?;
    let cleaned = fingerprint_config(config)?;
    let fingerprint = cleaned
        .fingerprint()
        .cloned()
        .ok_or_else(|| anyhow!("fingerprint missing after hashing"))?;

    let mut registry = store.load_registry()?;
    match store.check(&registry, &fingerprint, config.force_render)? {
        CacheDecision::Hit(entry) => {
            info!(%fingerprint, "using cached frames");
            from_cache(store, config, entry)
        }
        CacheDecision::Miss(reason) => {
            info!(%fingerprint, ?reason, "rendering frames");
            progress("Caching...");
            let generated = generate(config, source, store, tools, &fingerprint)?;
            let entry = CacheEntry::new(fingerprint.clone(), cleaned.into_fields())
                .with_sound(generated.sound.clone());
            registry.upsert(entry);
            store.save_registry(&registry)?;
            Ok(generated)
        }
    }
}

fn from_cache(store: &CacheStore, config: &Config, entry: CacheEntry) -> Result<PreparedAnimation> {
    let dirs = store.ensure(&entry.hash)?;
    let mut frames = FrameStore::streaming(list_frame_files(&dirs.output)?);
    let height = frames.first_frame_height()?;
    Ok(PreparedAnimation {
        fingerprint: entry.hash,
        frames,
        width: config.width as usize,
        height,
        sound: entry.sound_saved_path,
        from_cache: true,
    })
}

fn generate(
    config: &Config,
    source: &Path,
    store: &CacheStore,
    tools: &Toolbox,
    fingerprint: &Fingerprint,
) -> Result<PreparedAnimation> {
    let render_height = match config.height {
        Some(height) => height,
        None => {
            let (source_width, source_height) = tools.extractor.probe_dimensions(source)?;
            infer_height(config.width, source_width, source_height)
        }
    };

    let generation = store.begin_generation(fingerprint)?;
    let images = tools.extractor.extract_frames(&ExtractRequest {
        source,
        framerate: config.framerate,
        quality: config.clamped_quality(),
        chroma: config.chroma.as_deref(),
        staging_dir: &generation.dirs().staging,
    })?;
    if images.is_empty() {
        return Err(AppError::tool_failed("frame extractor", "no frames were extracted").into());
    }

    let sound = stage_sound(config, source, tools, &generation)?;
    let frames = render_all(config, tools, &generation, &images, render_height)?;
    let height = frames.first().map(String::as_str).map_or(0, frame_height);

    let sound = sound.map(|written| generation.final_path(&written));
    generation.commit()?;
    Ok(PreparedAnimation {
        fingerprint: fingerprint.clone(),
        frames: FrameStore::in_memory(frames),
        width: config.width as usize,
        height,
        sound,
        from_cache: false,
    })
}

fn stage_sound(config: &Config, source: &Path, tools: &Toolbox, generation: &Generation) -> Result<Option<PathBuf>> {
    match &config.sound {
        SoundSpec::Off => Ok(None),
        SoundSpec::File(file) => {
            let destination = generation.dirs().root.join(cached_audio_name(file));
            fs::copy(file, &destination).with_context(|| {
                format!("failed to copy sound file {} into the cache", file.display())
            })?;
            Ok(Some(destination))
        }
        SoundSpec::FromSource => tools
            .audio
            .extract_audio(source, &generation.dirs().root)
            .map(Some),
    }
}

fn render_all(
    config: &Config,
    tools: &Toolbox,
    generation: &Generation,
    images: &[PathBuf],
    height: u32,
) -> Result<Vec<String>> {
    let output = &generation.dirs().output;
    let render = |index: usize| -> Result<String> {
        let frame = tools
            .renderer
            .render(&images[index], config.width, height, &config.render_args)?;
        let path = output.join(frame_file_name(index));
        fs::write(&path, &frame)
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        Ok(frame)
    };

    // Frame 0 first and alone so its height is known before the rest start.
    let first = render(0)?;
    let pool = build_thread_pool(images.len() - 1)?;
    debug!(frames = images.len(), workers = pool.current_num_threads(), "rendering frames");
    let rest = pool.install(|| {
        (1..images.len())
            .into_par_iter()
            .map(&render)
            .collect::<Result<Vec<_>>>()
    })?;

    let mut frames = Vec::with_capacity(images.len());
    frames.push(first);
    frames.extend(rest);
    Ok(frames)
}

fn build_thread_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(jobs))
        .thread_name(|index| format!("anifetch-render-{index}"))
        .build()
        .context("failed to build frame render thread pool")
}

fn worker_count(jobs: usize) -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    cores.saturating_sub(1).clamp(1, jobs.max(1))
}
