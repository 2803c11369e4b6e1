//! Upload directory: files are stored under the client-supplied name.
//!
//! Two uploads with the same name overwrite each other (last write wins),
//! including concurrent requests. Names that could escape the directory are
//! rejected.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::models::StoredImage;

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_file_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Scratch file in the upload directory; becomes visible under its final
    /// name only once [`ImageStore::persist`] is called.
    pub fn create_temp(&self) -> Result<NamedTempFile, StoreError> {
        NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn persist(&self, file: NamedTempFile, name: &str) -> Result<StoredImage, StoreError> {
        let path = self.path_for(name)?;
        file.persist(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(StoredImage {
            name: name.to_string(),
            path,
        })
    }

    #[cfg(test)]
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<StoredImage, StoreError> {
        use std::io::Write;

        validate_file_name(name)?;
        let mut file = self.create_temp()?;
        file.write_all(bytes).map_err(|source| StoreError::Io {
            path: file.path().to_path_buf(),
            source,
        })?;
        self.persist(file, name)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Io { path, source },
        })
    }
}

/// Accepts any name that stays a single path component inside the upload
/// directory.
pub fn validate_file_name(name: &str) -> Result<&str, StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with("..");
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Opens a stored image with its format sniffed from the leading bytes.
///
/// Uploads keep the client's file name, so the extension may be missing or
/// wrong; it is only used when the content matches no known signature.
pub fn open_image(path: &Path) -> image::ImageResult<image::io::Reader<BufReader<File>>> {
    Ok(image::io::Reader::open(path)?.with_guessed_format()?)
}

/// Content type for serving a stored file, guessed from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}
