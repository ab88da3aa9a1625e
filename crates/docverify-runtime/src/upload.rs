//! Image uploads accepted by the pipeline.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

/// Accepted image extensions, lower-case.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported file type '{0}': expected jpg, jpeg, or png")]
    UnsupportedFormat(String),

    #[error("Upload is empty")]
    Empty,

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An image on disk, ready for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    path: PathBuf,
    filename: String,
}

impl ImageUpload {
    /// Store `bytes` under a timestamped, sanitized name in `uploads_dir`.
    ///
    /// The stored name is `YYYYmmdd_HHMMSS_ffffff_<name>`, with path
    /// separators in `<name>` replaced by underscores.
    pub fn save(uploads_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, UploadError> {
        check_extension(original_name)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        std::fs::create_dir_all(uploads_dir)?;

        let filename = format!(
            "{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S_%6f"),
            sanitize(original_name)
        );
        let path = uploads_dir.join(&filename);
        std::fs::write(&path, bytes)?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Upload stored");
        Ok(Self { path, filename })
    }

    /// Use an image that is already on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        check_extension(&filename)?;
        Ok(Self { path, filename })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name recorded in the document store.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn check_extension(name: &str) -> Result<(), UploadError> {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedFormat(name.to_string()))
    }
}
