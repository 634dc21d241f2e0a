//! Preview resources for staged photos.
//!
//! Every staged photo holds one live preview URI. The store that created it
//! must be told to release it when the photo leaves the session.

use crate::collection::PhotoFile;
use facealbum_core::PhotoId;
use image::imageops::FilterType;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("preview io error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Allocates and releases locally resolvable preview URIs.
pub trait PreviewStore: Send {
    fn create(&mut self, id: &PhotoId, file: &PhotoFile) -> Result<String, PreviewError>;

    /// Release a preview. Unknown URIs are ignored.
    fn release(&mut self, uri: &str);

    /// Number of previews currently allocated.
    fn live(&self) -> usize;
}

/// In-memory previews: `preview://<id>` handles with no backing file.
#[derive(Debug, Default)]
pub struct MemoryPreviews {
    live: HashSet<String>,
}

impl MemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewStore for MemoryPreviews {
    fn create(&mut self, id: &PhotoId, _file: &PhotoFile) -> Result<String, PreviewError> {
        let uri = format!("preview://{id}");
        self.live.insert(uri.clone());
        Ok(uri)
    }

    fn release(&mut self, uri: &str) {
        self.live.remove(uri);
    }

    fn live(&self) -> usize {
        self.live.len()
    }
}

/// JPEG thumbnails written to a cache directory, served as `file://` URIs.
pub struct ThumbnailPreviews {
    dir: PathBuf,
    size: u32,
    live: HashMap<String, PathBuf>,
}

impl ThumbnailPreviews {
    pub fn new(dir: impl Into<PathBuf>, size: u32) -> Result<Self, PreviewError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PreviewError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, size, live: HashMap::new() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PreviewStore for ThumbnailPreviews {
    fn create(&mut self, id: &PhotoId, file: &PhotoFile) -> Result<String, PreviewError> {
        let path = self.dir.join(format!("{id}.jpg"));

        // Undecodable photos still get a preview: the original bytes.
        let written = match image::load_from_memory(file.bytes()) {
            Ok(img) => {
                let img = if img.width() > self.size || img.height() > self.size {
                    img.resize(self.size, self.size, FilterType::Lanczos3)
                } else {
                    img
                };
                let thumbnail = img.to_rgb8();
                thumbnail.save(&path).map_err(|e| {
                    tracing::warn!(photo = %id, error = %e, "thumbnail encode failed; storing original");
                })
            }
            Err(e) => {
                tracing::debug!(photo = %id, name = file.name(), error = %e, "not decodable; storing original");
                Err(())
            }
        };
        if written.is_err() {
            std::fs::write(&path, file.bytes()).map_err(|source| PreviewError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let uri = format!("file://{}", path.display());
        self.live.insert(uri.clone(), path);
        Ok(uri)
    }

    fn release(&mut self, uri: &str) {
        if let Some(path) = self.live.remove(uri) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove preview");
            }
        }
    }

    fn live(&self) -> usize {
        self.live.len()
    }
}
