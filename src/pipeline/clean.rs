//! Output directory cleaning
//!
//! Cleaning only happens in production builds; in development it is a no-op.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::mode::Mode;

/// Remove every entry under `output_dir`, keeping the directory itself.
/// Returns the number of entries removed.
pub fn clean(output_dir: &Path, mode: Mode) -> PipelineResult<usize> {
    if mode.is_development() {
        debug!("skipping clean in development mode");
        return Ok(0);
    }

    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{}", PipelineError::MissingOutputDirectory(output_dir.to_path_buf()));
            return Ok(0);
        }
        Err(e) => return Err(PipelineError::io(output_dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(output_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| PipelineError::io(&path, e))?;

        if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .map_err(|e| PipelineError::io(&path, e))?;

        debug!("removed {}", path.display());
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("fonts")).unwrap();
        fs::write(dist.join("bundle.js"), "x").unwrap();
        fs::write(dist.join("fonts/a.woff"), "x").unwrap();
        dir
    }

    #[test]
    fn test_production_clean_empties_directory() {
        let dir = populated();
        let dist = dir.path().join("dist");

        assert_eq!(clean(&dist, Mode::Production).unwrap(), 2);
        assert!(dist.exists());
        assert_eq!(fs::read_dir(&dist).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let dir = populated();
        let dist = dir.path().join("dist");

        clean(&dist, Mode::Production).unwrap();
        assert_eq!(clean(&dist, Mode::Production).unwrap(), 0);
        assert!(dist.exists());
        assert_eq!(fs::read_dir(&dist).unwrap().count(), 0);
    }

    #[test]
    fn test_development_clean_is_noop() {
        let dir = populated();
        let dist = dir.path().join("dist");

        assert_eq!(clean(&dist, Mode::Development).unwrap(), 0);
        assert!(dist.join("bundle.js").exists());
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clean(&dir.path().join("dist"), Mode::Production).unwrap(), 0);
    }
}
