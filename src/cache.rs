use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::fingerprint::{lookup, Fingerprint};

pub const REGISTRY_FILE_NAME: &str = "caches.json";
pub const ASSETS_DIR_NAME: &str = "assets";
pub const STAGING_DIR_NAME: &str = "video";
pub const OUTPUT_DIR_NAME: &str = "output";
const PARTIAL_SUFFIX: &str = ".partial";

/// One cached animation. The flattened `config` map is the cleaned
/// configuration the digest was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub hash: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_saved_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl CacheEntry {
    pub fn new(hash: Fingerprint, config: Map<String, Value>) -> Self {
        Self {
            hash,
            sound_saved_path: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            config,
        }
    }

    pub fn with_sound(mut self, path: Option<PathBuf>) -> Self {
        self.sound_saved_path = path;
        self
    }

    fn field_display(&self, key: &str) -> String {
        match self.config.get(key) {
            None | Some(Value::Null) => "None".to_owned(),
            Some(Value::String(value)) => value.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// One-line summary used by `--cache-list`.
    pub fn summary(&self) -> String {
        let video = self
            .config
            .get("source")
            .and_then(Value::as_str)
            .and_then(|source| Path::new(source).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "?".to_owned());
        format!(
            "video: {} | width: {} | chroma: {}",
            video,
            self.field_display("width"),
            self.field_display("chroma")
        )
    }
}

/// Ordered cache registry, stored as a bare JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Registry {
    entries: Vec<CacheEntry>,
}

impl Registry {
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `entry`, replacing in place any entry with the same digest.
    pub fn upsert(&mut self, entry: CacheEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|item| item.hash == entry.hash) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }
}

/// Directory layout of one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirs {
    pub root: PathBuf,
    /// Extracted source images; removed once generation finishes.
    pub staging: PathBuf,
    /// One text file per rendered frame.
    pub output: PathBuf,
}

impl CacheDirs {
    fn at(root: PathBuf) -> Self {
        Self {
            staging: root.join(STAGING_DIR_NAME),
            output: root.join(OUTPUT_DIR_NAME),
            root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    Forced,
    NoEntry,
    /// The registry knows the digest but the frames are missing or empty.
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheDecision {
    Hit(CacheEntry),
    Miss(MissReason),
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<CacheEntry>,
    /// Entries whose directory was already gone.
    pub missing_dirs: Vec<PathBuf>,
    /// Requested positions with no entry.
    pub out_of_range: Vec<usize>,
}

/// Durable cache rooted at the application data directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(ASSETS_DIR_NAME))
            .with_context(|| format!("failed to create data directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR_NAME)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }

    /// Directory namespace for `fingerprint`. Creates the data root if needed
    /// but leaves the entry itself to [`CacheStore::begin_generation`].
    pub fn ensure(&self, fingerprint: &Fingerprint) -> Result<CacheDirs> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create data directory {}", self.root.display()))?;
        Ok(CacheDirs::at(self.root.join(fingerprint.as_str())))
    }

    pub fn load_registry(&self) -> Result<Registry> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(Registry::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read cache registry {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Registry::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache registry JSON {}", path.display()))
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<PathBuf> {
        let path = self.registry_path();
        let json = serde_json::to_string_pretty(registry)
            .context("failed to serialize cache registry JSON")?;
        fs::write(&path, format!("{json}\n"))
            .with_context(|| format!("failed to write cache registry {}", path.display()))?;
        Ok(path)
    }

    /// Decide between reuse and regeneration. Any one of a forced render, a
    /// missing registry entry or an empty output directory is enough for a
    /// miss.
    pub fn check(&self, registry: &Registry, fingerprint: &Fingerprint, force: bool) -> Result<CacheDecision> {
        if force {
            info!(%fingerprint, "forced render requested");
            return Ok(CacheDecision::Miss(MissReason::Forced));
        }
        let Some(entry) = lookup(fingerprint, registry) else {
            info!(%fingerprint, "no cache entry for this configuration");
            return Ok(CacheDecision::Miss(MissReason::NoEntry));
        };

        let dirs = self.ensure(fingerprint)?;
        if let Some(problem) = self.corruption(&dirs, entry)? {
            let error = AppError::cache_corrupt(problem.clone());
            warn!("{error}; will regenerate");
            return Ok(CacheDecision::Miss(MissReason::Corrupt(problem)));
        }
        Ok(CacheDecision::Hit(entry.clone()))
    }

    fn corruption(&self, dirs: &CacheDirs, entry: &CacheEntry) -> Result<Option<String>> {
        if !dirs.output.is_dir() {
            return Ok(Some(format!(
                "cache folder {} found but output is missing",
                dirs.root.display()
            )));
        }
        if list_frame_files(&dirs.output)?.is_empty() {
            return Ok(Some(format!(
                "cache output {} holds no frames",
                dirs.output.display()
            )));
        }
        if let Some(sound) = entry.sound_saved_path.as_deref() {
            if !sound.is_file() {
                return Ok(Some(format!("cached audio {} is missing", sound.display())));
            }
        }
        Ok(None)
    }

    /// Start writing a fresh copy of `fingerprint` next to the live one.
    pub fn begin_generation(&self, fingerprint: &Fingerprint) -> Result<Generation> {
        let target = self.ensure(fingerprint)?;
        let partial_root = self
            .root
            .join(format!("{}{}", fingerprint.as_str(), PARTIAL_SUFFIX));
        if partial_root.exists() {
            fs::remove_dir_all(&partial_root).with_context(|| {
                format!("failed to remove stale partial cache {}", partial_root.display())
            })?;
        }
        let dirs = CacheDirs::at(partial_root);
        for dir in [&dirs.staging, &dirs.output] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create cache dir {}", dir.display()))?;
        }
        debug!(partial = %dirs.root.display(), "started cache generation");
        Ok(Generation {
            dirs,
            target,
            committed: false,
        })
    }

    /// Remove entries by zero-based position, highest first, together with
    /// their directories. The registry is saved once at the end.
    pub fn delete(&self, indices: &[usize]) -> Result<DeleteReport> {
        let mut registry = self.load_registry()?;
        let mut report = DeleteReport::default();
        let unique: BTreeSet<usize> = indices.iter().copied().collect();

        for index in unique.into_iter().rev() {
            if index >= registry.entries.len() {
                report.out_of_range.push(index);
                continue;
            }
            let dir = self.root.join(registry.entries[index].hash.as_str());
            if self.remove_entry_dir(&dir)? {
                info!(dir = %dir.display(), "deleted cache directory");
            } else {
                report.missing_dirs.push(dir);
            }
            report.removed.push(registry.entries.remove(index));
        }

        report.out_of_range.reverse();
        self.save_registry(&registry)?;
        Ok(report)
    }

    /// Remove every entry and its directory. Returns the number of entries.
    pub fn clear(&self) -> Result<usize> {
        let registry = self.load_registry()?;
        let all = (0..registry.len()).collect::<Vec<_>>();
        let report = self.delete(&all)?;
        Ok(report.removed.len())
    }

    fn remove_entry_dir(&self, dir: &Path) -> Result<bool> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "cache directory already missing");
            return Ok(false);
        }
        fs::remove_dir_all(dir)
            .with_context(|| format!("failed to delete cache directory {}", dir.display()))?;
        Ok(true)
    }
}

/// A cache directory being written. Nothing is visible under the
/// fingerprint until [`Generation::commit`]; dropping without committing
/// discards the partial output and leaves any previous cache intact.
#[derive(Debug)]
pub struct Generation {
    dirs: CacheDirs,
    target: CacheDirs,
    committed: bool,
}

impl Generation {
    pub fn dirs(&self) -> &CacheDirs {
        &self.dirs
    }

    /// Final location of a file written under the partial root.
    pub fn final_path(&self, written: &Path) -> PathBuf {
        match written.strip_prefix(&self.dirs.root) {
            Ok(relative) => self.target.root.join(relative),
            Err(_) => written.to_path_buf(),
        }
    }

    /// Drop the staging images and swap the partial directory into place.
    pub fn commit(mut self) -> Result<CacheDirs> {
        if self.dirs.staging.exists() {
            fs::remove_dir_all(&self.dirs.staging).with_context(|| {
                format!("failed to remove staging frames {}", self.dirs.staging.display())
            })?;
        }
        if self.target.root.exists() {
            fs::remove_dir_all(&self.target.root).with_context(|| {
                format!("failed to replace cache directory {}", self.target.root.display())
            })?;
        }
        fs::rename(&self.dirs.root, &self.target.root).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                self.dirs.root.display(),
                self.target.root.display()
            )
        })?;
        self.committed = true;
        debug!(dir = %self.target.root.display(), "committed cache generation");
        Ok(self.target.clone())
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        if !self.committed && self.dirs.root.exists() {
            if let Err(error) = fs::remove_dir_all(&self.dirs.root) {
                warn!(dir = %self.dirs.root.display(), %error, "failed to discard partial cache");
            }
        }
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:06}.txt")
}

/// Frame files of an output directory in playback order.
pub fn list_frame_files(output: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(output)
        .with_context(|| format!("failed to read frame directory {}", output.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", output.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fingerprint::fingerprint_config;
    use tempfile::tempdir;

    fn entry_for(width: u32) -> CacheEntry {
        let config = Config {
            width,
            ..Config::default()
        }
        .with_source(PathBuf::from("/tmp/clip.mp4"));
        let cleaned = fingerprint_config(&config).expect("fingerprint");
        let hash = cleaned.fingerprint().cloned().expect("hash");
        CacheEntry::new(hash, cleaned.into_fields())
    }

    fn populate(store: &CacheStore, entry: &CacheEntry) {
        let output = store.root().join(entry.hash.as_str()).join(OUTPUT_DIR_NAME);
        fs::create_dir_all(&output).expect("output dir");
        fs::write(output.join(frame_file_name(0)), "frame\n").expect("frame");
    }

    #[test]
    fn registry_round_trips_as_a_json_array() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let mut registry = Registry::default();
        registry.upsert(entry_for(40).with_sound(Some(PathBuf::from("/x/output_audio.m4a"))));
        store.save_registry(&registry).expect("save");

        let raw = fs::read_to_string(store.registry_path()).expect("read");
        let parsed: Value = serde_json::from_str(&raw).expect("json");
        let first = &parsed.as_array().expect("array")[0];
        assert!(first.get("hash").is_some());
        assert_eq!(first["width"], 40);
        assert_eq!(first["sound_saved_path"], "/x/output_audio.m4a");

        assert_eq!(store.load_registry().expect("load"), registry);
    }

    #[test]
    fn upsert_replaces_same_fingerprint_in_place() {
        let mut registry = Registry::default();
        registry.upsert(entry_for(40));
        registry.upsert(entry_for(50));
        registry.upsert(entry_for(40).with_sound(Some(PathBuf::from("a.mp3"))));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].sound_saved_path, Some(PathBuf::from("a.mp3")));
    }

    #[test]
    fn check_reports_each_miss_trigger() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let entry = entry_for(40);
        let mut registry = Registry::default();

        assert_eq!(
            store.check(&registry, &entry.hash, false).expect("check"),
            CacheDecision::Miss(MissReason::NoEntry)
        );

        registry.upsert(entry.clone());
        assert!(matches!(
            store.check(&registry, &entry.hash, false).expect("check"),
            CacheDecision::Miss(MissReason::Corrupt(_))
        ));

        fs::create_dir_all(store.root().join(entry.hash.as_str()).join(OUTPUT_DIR_NAME))
            .expect("empty output");
        assert!(matches!(
            store.check(&registry, &entry.hash, false).expect("check"),
            CacheDecision::Miss(MissReason::Corrupt(_))
        ));

        populate(&store, &entry);
        assert!(matches!(
            store.check(&registry, &entry.hash, false).expect("check"),
            CacheDecision::Hit(_)
        ));
        assert_eq!(
            store.check(&registry, &entry.hash, true).expect("check"),
            CacheDecision::Miss(MissReason::Forced)
        );
    }

    #[test]
    fn dropped_generation_keeps_previous_cache() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let entry = entry_for(40);
        populate(&store, &entry);

        let generation = store.begin_generation(&entry.hash).expect("begin");
        fs::write(generation.dirs().output.join(frame_file_name(0)), "new").expect("write");
        let partial = generation.dirs().root.clone();
        drop(generation);

        assert!(!partial.exists());
        let live = store.root().join(entry.hash.as_str()).join(OUTPUT_DIR_NAME);
        assert_eq!(fs::read_to_string(live.join(frame_file_name(0))).expect("read"), "frame\n");
    }

    #[test]
    fn commit_replaces_longer_previous_output() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let entry = entry_for(40);
        populate(&store, &entry);
        let live = store.root().join(entry.hash.as_str()).join(OUTPUT_DIR_NAME);
        fs::write(live.join(frame_file_name(1)), "old tail").expect("tail");

        let generation = store.begin_generation(&entry.hash).expect("begin");
        fs::write(generation.dirs().output.join(frame_file_name(0)), "new").expect("write");
        let dirs = generation.commit().expect("commit");

        assert_eq!(list_frame_files(&dirs.output).expect("list").len(), 1);
        assert!(!dirs.staging.exists());
    }

    #[test]
    fn delete_middle_entry_keeps_order_of_the_rest() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let entries = [entry_for(30), entry_for(40), entry_for(50)];
        let mut registry = Registry::default();
        for entry in &entries {
            populate(&store, entry);
            registry.upsert(entry.clone());
        }
        store.save_registry(&registry).expect("save");

        let report = store.delete(&[1]).expect("delete");
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].hash, entries[1].hash);

        let remaining = store.load_registry().expect("load");
        let hashes = remaining.entries().iter().map(|e| e.hash.clone()).collect::<Vec<_>>();
        assert_eq!(hashes, vec![entries[0].hash.clone(), entries[2].hash.clone()]);
        assert!(!store.root().join(entries[1].hash.as_str()).exists());
        assert!(store.root().join(entries[0].hash.as_str()).exists());
        assert!(store.root().join(entries[2].hash.as_str()).exists());
    }

    #[test]
    fn delete_many_handles_missing_dirs_and_bad_indices() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let entries = [entry_for(30), entry_for(40), entry_for(50)];
        let mut registry = Registry::default();
        for entry in &entries {
            registry.upsert(entry.clone());
        }
        populate(&store, &entries[0]);
        store.save_registry(&registry).expect("save");

        let report = store.delete(&[0, 2, 2, 9]).expect("delete");
        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.missing_dirs.len(), 1);
        assert_eq!(report.out_of_range, vec![9]);

        let remaining = store.load_registry().expect("load");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.entries()[0].hash, entries[1].hash);
    }

    #[test]
    fn clear_empties_registry_and_dirs() {
        let dir = tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).expect("store");
        let mut registry = Registry::default();
        for entry in [entry_for(30), entry_for(40)] {
            populate(&store, &entry);
            registry.upsert(entry);
        }
        store.save_registry(&registry).expect("save");

        assert_eq!(store.clear().expect("clear"), 2);
        assert!(store.load_registry().expect("load").is_empty());
    }

    #[test]
    fn frame_files_sort_in_playback_order() {
        let dir = tempdir().expect("tempdir");
        for index in [10, 2, 0, 1] {
            fs::write(dir.path().join(frame_file_name(index)), "x").expect("write");
        }
        let names = list_frame_files(dir.path())
            .expect("list")
            .into_iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["frame_000000.txt", "frame_000001.txt", "frame_000002.txt", "frame_000010.txt"]
        );
    }

    #[test]
    fn summary_names_video_width_and_chroma() {
        let entry = entry_for(40);
        assert_eq!(entry.summary(), "video: clip.mp4 | width: 40 | chroma: None");
    }
}
