//! Ordered collection of photos staged for an album-in-progress.

use crate::preview::{PreviewError, PreviewStore};
use facealbum_core::PhotoId;
use std::path::Path;
use std::sync::Arc;

/// Binary image data selected by the user, with its original file name.
///
/// Cloning shares the bytes; the session remains their only owner.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }

    /// Read a photo from disk, named after its file name.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, for handing to the detection engine.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

/// One photo added to the album during an editing session.
#[derive(Debug, Clone)]
pub struct StagedPhoto {
    pub id: PhotoId,
    pub file: PhotoFile,
    pub preview_uri: String,
}

/// Authoritative ordered list of staged photos.
pub struct PhotoCollection {
    photos: Vec<StagedPhoto>,
    previews: Box<dyn PreviewStore>,
    /// Insertion counter, never reset, so ids stay unique within the session.
    next_ordinal: u64,
}

impl PhotoCollection {
    pub fn new(previews: Box<dyn PreviewStore>) -> Self {
        Self { photos: Vec::new(), previews, next_ordinal: 0 }
    }

    /// Stage files in input order and return the newly created records.
    ///
    /// All-or-nothing: if any preview cannot be created, previews allocated
    /// for this batch are released and the collection is unchanged.
    pub fn add(&mut self, files: Vec<PhotoFile>) -> Result<Vec<StagedPhoto>, PreviewError> {
        let salt = chrono::Utc::now().timestamp_millis();
        let mut added = Vec::with_capacity(files.len());

        for file in files {
            let id = PhotoId::new(format!("{}-{salt}-{}", slugify(file.name()), self.next_ordinal));
            self.next_ordinal += 1;

            match self.previews.create(&id, &file) {
                Ok(preview_uri) => added.push(StagedPhoto { id, file, preview_uri }),
                Err(e) => {
                    for photo in &added {
                        self.previews.release(&photo.preview_uri);
                    }
                    return Err(e);
                }
            }
        }

        self.photos.extend(added.iter().cloned());
        Ok(added)
    }

    /// Remove a photo and release its preview. Absent ids are a no-op.
    pub fn remove(&mut self, id: &PhotoId) -> Option<StagedPhoto> {
        let pos = self.photos.iter().position(|p| &p.id == id)?;
        let photo = self.photos.remove(pos);
        self.previews.release(&photo.preview_uri);
        Some(photo)
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.photos.iter().any(|p| &p.id == id)
    }

    pub fn get(&self, id: &PhotoId) -> Option<&StagedPhoto> {
        self.photos.iter().find(|p| &p.id == id)
    }

    /// Photos in display (insertion) order.
    pub fn photos(&self) -> &[StagedPhoto] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }

    /// Remove every photo, releasing all previews.
    pub fn clear(&mut self) {
        for photo in self.photos.drain(..) {
            self.previews.release(&photo.preview_uri);
        }
    }
}

/// Lowercase, spaces to `-`, drop anything outside ASCII `[a-z0-9_-]`,
/// collapse and trim dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        let mapped = if ch.is_whitespace() || ch == '-' {
            '-'
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            ch
        } else {
            continue;
        };
        if mapped == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(mapped);
    }
    slug.trim_matches('-').to_string()
}
