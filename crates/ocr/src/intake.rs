use snap_core::AppConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("input path does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn has_supported_extension(path: &Path, config: &AppConfig) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| config.is_supported_extension(e))
}

/// Resolve the images to process from a file or directory.
///
/// A directory is scanned one level deep and the matches are sorted by path.
/// A single file with an unsupported extension is skipped with a warning.
pub fn collect_image_files(input: &Path, config: &AppConfig) -> Result<Vec<PathBuf>, IntakeError> {
    if !input.exists() {
        return Err(IntakeError::NotFound(input.to_path_buf()));
    }

    if input.is_file() {
        if has_supported_extension(input, config) {
            return Ok(vec![input.to_path_buf()]);
        }
        tracing::warn!("Skipping {}: unsupported file type", input.display());
        return Ok(Vec::new());
    }

    let read_err = |source| IntakeError::ReadDir {
        path: input.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && has_supported_extension(&path, config) {
            files.push(path);
        } else {
            tracing::debug!("Ignoring {}", path.display());
        }
    }
    files.sort();
    tracing::info!("Found {} image(s) in {}", files.len(), input.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"x").unwrap();
        p
    }

    #[test]
    fn directory_is_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.PNG");
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "c.tiff");
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        touch(&dir.path().join("nested.png"), "deep.png");

        let files = collect_image_files(dir.path(), &AppConfig::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.tiff"]);
    }

    #[test]
    fn single_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let p = touch(dir.path(), "shot.jpeg");
        assert_eq!(collect_image_files(&p, &AppConfig::default()).unwrap(), vec![p]);
    }

    #[test]
    fn unsupported_single_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let p = touch(dir.path(), "statement.pdf");
        assert!(collect_image_files(&p, &AppConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_image_files(&dir.path().join("nope"), &AppConfig::default()).unwrap_err();
        assert!(matches!(err, IntakeError::NotFound(_)));
    }
}
