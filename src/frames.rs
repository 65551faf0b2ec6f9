use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// Animation frames indexed `0..len()` in playback order.
///
/// A store opened from disk starts empty and is filled one file at a time
/// as playback asks for the next index; once every file has been read the
/// store plays purely from memory.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    loaded: Vec<String>,
    pending: VecDeque<PathBuf>,
}

impl FrameStore {
    pub fn in_memory(frames: Vec<String>) -> Self {
        Self {
            loaded: frames,
            pending: VecDeque::new(),
        }
    }

    /// Lazily backed by `paths`, which must already be in playback order.
    pub fn streaming(paths: Vec<PathBuf>) -> Self {
        Self {
            loaded: Vec::with_capacity(paths.len()),
            pending: paths.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.loaded.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.pending.is_empty()
    }

    /// Frame `index`. Reading past the loaded prefix is only allowed one
    /// frame at a time so indices stay contiguous.
    pub fn get(&mut self, index: usize) -> Result<&str> {
        if index == self.loaded.len() {
            let path = self
                .pending
                .pop_front()
                .ok_or_else(|| anyhow!("frame {} requested but only {} exist", index, self.loaded.len()))?;
            let frame = fs::read_to_string(&path)
                .with_context(|| format!("failed to read cached frame {}", path.display()))?;
            self.loaded.push(frame);
        } else if index > self.loaded.len() {
            return Err(anyhow!(
                "frame {} requested before frame {} was loaded",
                index,
                self.loaded.len()
            ));
        }
        Ok(&self.loaded[index])
    }

    /// Height in rows of the first frame, loading it if needed.
    pub fn first_frame_height(&mut self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        Ok(frame_height(self.get(0)?))
    }
}

pub fn frame_height(frame: &str) -> usize {
    frame.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn streaming_store_fills_in_order() {
        let dir = tempdir().expect("tempdir");
        let paths = (0..3)
            .map(|index| {
                let path = dir.path().join(format!("frame_{index:06}.txt"));
                fs::write(&path, format!("F{index}\nrow\n")).expect("write");
                path
            })
            .collect::<Vec<_>>();

        let mut store = FrameStore::streaming(paths);
        assert_eq!(store.len(), 3);
        assert_eq!(store.loaded_len(), 0);
        assert_eq!(store.first_frame_height().expect("height"), 2);
        assert!(store.get(2).is_err(), "cannot skip ahead");
        assert_eq!(store.get(1).expect("frame"), "F1\nrow\n");
        assert_eq!(store.get(2).expect("frame"), "F2\nrow\n");
        assert!(store.is_fully_loaded());

        fs::remove_dir_all(dir.path()).expect("remove");
        assert_eq!(store.get(0).expect("memory"), "F0\nrow\n");
    }

    #[test]
    fn in_memory_store_rejects_out_of_range() {
        let mut store = FrameStore::in_memory(vec!["a".into()]);
        assert_eq!(store.get(0).expect("frame"), "a");
        assert!(store.get(1).is_err());
    }
}
