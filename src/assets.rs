use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::errors::AppError;

/// Find `requested` on disk, falling back to `<assets_dir>/<requested>`.
pub fn resolve_source(requested: &Path, assets_dir: &Path) -> Result<PathBuf> {
    if requested.is_file() {
        return Ok(requested.to_path_buf());
    }
    let candidate = assets_dir.join(requested);
    if candidate.is_file() {
        debug!(path = %candidate.display(), "found input in assets directory");
        return Ok(candidate);
    }
    Err(AppError::missing_input(format!(
        "File not found: {}\nMake sure the file exists or that it is in the correct directory.",
        requested.display()
    ))
    .into())
}

/// Copy `source` into `assets_dir` unless it already lives there, and
/// return the asset path. The asset path is what gets fingerprinted, so the
/// same clip hashes the same from any working directory.
pub fn import(source: &Path, assets_dir: &Path) -> Result<PathBuf> {
    let name = source
        .file_name()
        .with_context(|| format!("input path has no file name: {}", source.display()))?;
    let destination = assets_dir.join(name);
    if same_file(source, &destination) {
        return Ok(destination);
    }
    fs::create_dir_all(assets_dir)
        .with_context(|| format!("failed to create assets dir {}", assets_dir.display()))?;
    fs::copy(source, &destination).with_context(|| {
        format!(
            "failed to copy {} into {}",
            source.display(),
            assets_dir.display()
        )
    })?;
    debug!(from = %source.display(), to = %destination.display(), "imported asset");
    Ok(destination)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Resolve then import.
pub fn prepare_source(requested: &Path, assets_dir: &Path) -> Result<PathBuf> {
    let found = resolve_source(requested, assets_dir)?;
    import(&found, assets_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{find_app_error, AppErrorKind};
    use tempfile::tempdir;

    #[test]
    fn falls_back_to_assets_directory() {
        let dir = tempdir().expect("tempdir");
        let assets = dir.path().join("assets");
        fs::create_dir_all(&assets).expect("assets");
        fs::write(assets.join("clip.mp4"), b"video").expect("write");

        let found = resolve_source(Path::new("clip.mp4"), &assets).expect("resolve");
        assert_eq!(found, assets.join("clip.mp4"));
    }

    #[test]
    fn missing_file_is_missing_input() {
        let dir = tempdir().expect("tempdir");
        let error = resolve_source(Path::new("nope.mp4"), dir.path()).unwrap_err();
        assert_eq!(
            find_app_error(&error).map(|coded| coded.kind),
            Some(AppErrorKind::MissingInput)
        );
    }

    #[test]
    fn import_copies_once_and_tolerates_same_file() {
        let dir = tempdir().expect("tempdir");
        let assets = dir.path().join("assets");
        let outside = dir.path().join("clip.gif");
        fs::write(&outside, b"gif").expect("write");

        let imported = import(&outside, &assets).expect("import");
        assert_eq!(imported, assets.join("clip.gif"));
        assert_eq!(fs::read(&imported).expect("read"), b"gif");

        let again = import(&imported, &assets).expect("re-import");
        assert_eq!(again, imported);
    }
}
