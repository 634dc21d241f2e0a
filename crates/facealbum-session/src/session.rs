//! Album authoring session: staged photos, their faces, and the active face
//! search.
//!
//! [`AlbumSession`] is the plain state machine. [`spawn_session`] moves it
//! into a task that applies one request at a time, so every mutation is
//! atomic to the rest of the application.

use crate::collection::{PhotoCollection, PhotoFile, StagedPhoto};
use crate::preview::{PreviewError, PreviewStore};
use facealbum_core::{
    search, Descriptor, EuclideanMatcher, FaceDetection, FaceIndex, Navigation, OverlayActivation, PhotoId,
    SearchResultSet,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),
    #[error("session task exited")]
    ChannelClosed,
}

pub struct AlbumSession {
    photos: PhotoCollection,
    faces: FaceIndex,
    target: Option<Descriptor>,
    results: SearchResultSet,
    matcher: EuclideanMatcher,
}

impl AlbumSession {
    pub fn new(previews: Box<dyn PreviewStore>, match_threshold: f32) -> Self {
        Self {
            photos: PhotoCollection::new(previews),
            faces: FaceIndex::new(),
            target: None,
            results: SearchResultSet::new(),
            matcher: EuclideanMatcher::new(match_threshold),
        }
    }

    /// Stage files; returns only the newly created photos.
    pub fn add(&mut self, files: Vec<PhotoFile>) -> Result<Vec<StagedPhoto>, SessionError> {
        let added = self.photos.add(files)?;
        tracing::info!(added = added.len(), total = self.photos.len(), "photos staged");
        Ok(added)
    }

    /// Remove a photo together with its faces. Returns whether it was present.
    pub fn remove(&mut self, id: &PhotoId) -> bool {
        if self.photos.remove(id).is_none() {
            tracing::debug!(photo = %id, "remove: photo not staged");
            return false;
        }
        if self.faces.remove(id).is_some() {
            self.recompute();
        }
        tracing::info!(photo = %id, total = self.photos.len(), "photo removed");
        true
    }

    /// Commit a detection result, unless the photo has left the collection.
    pub fn commit_detections(&mut self, id: &PhotoId, detections: Vec<FaceDetection>) -> bool {
        if !self.photos.contains(id) {
            tracing::debug!(photo = %id, "discarding detections for removed photo");
            return false;
        }
        self.faces.insert(id.clone(), detections);
        self.recompute();
        true
    }

    pub fn set_search_target(&mut self, target: Descriptor) {
        self.target = Some(target);
        self.recompute();
    }

    pub fn clear_search_target(&mut self) {
        self.target = None;
        self.recompute();
    }

    /// Use face `face` of photo `id` as the search target.
    ///
    /// Returns where the host should navigate, or `None` if no such face exists.
    pub fn activate_overlay(&mut self, id: &PhotoId, face: usize) -> Option<Navigation> {
        let detection = self.faces.get(id)?.get(face)?;
        let activation = OverlayActivation::for_detection(detection);
        self.set_search_target(activation.target);
        tracing::info!(photo = %id, face, matches = self.results.len(), "face search started");
        Some(activation.navigation)
    }

    pub fn photos(&self) -> &[StagedPhoto] {
        self.photos.photos()
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.photos.contains(id)
    }

    pub fn faces(&self) -> &FaceIndex {
        &self.faces
    }

    pub fn detections(&self, id: &PhotoId) -> Option<&[FaceDetection]> {
        self.faces.get(id)
    }

    pub fn search_target(&self) -> Option<&Descriptor> {
        self.target.as_ref()
    }

    pub fn results(&self) -> &SearchResultSet {
        &self.results
    }

    pub fn live_previews(&self) -> usize {
        self.photos.live_previews()
    }

    /// End the session: release every preview and forget all face data.
    pub fn close(&mut self) {
        if !self.photos.is_empty() {
            tracing::info!(photos = self.photos.len(), "closing session");
        }
        self.photos.clear();
        self.faces = FaceIndex::new();
        self.target = None;
        self.results.clear();
    }

    fn recompute(&mut self) {
        self.results = search(&self.faces, self.target.as_ref(), &self.matcher);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            photos: self.photos.photos().to_vec(),
            faces: self.faces.clone(),
            target: self.target.clone(),
            results: self.results.clone(),
        }
    }
}

impl Drop for AlbumSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Point-in-time copy of the session state, for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub photos: Vec<StagedPhoto>,
    pub faces: FaceIndex,
    pub target: Option<Descriptor>,
    pub results: SearchResultSet,
}

enum SessionRequest {
    Add {
        files: Vec<PhotoFile>,
        reply: oneshot::Sender<Result<Vec<StagedPhoto>, SessionError>>,
    },
    Remove {
        id: PhotoId,
        reply: oneshot::Sender<bool>,
    },
    Commit {
        id: PhotoId,
        detections: Vec<FaceDetection>,
        reply: oneshot::Sender<bool>,
    },
    SetTarget {
        target: Option<Descriptor>,
        reply: oneshot::Sender<()>,
    },
    ActivateOverlay {
        id: PhotoId,
        face: usize,
        reply: oneshot::Sender<Option<Navigation>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
    results: watch::Receiver<SearchResultSet>,
}

impl SessionHandle {
    pub async fn add(&self, files: Vec<PhotoFile>) -> Result<Vec<StagedPhoto>, SessionError> {
        self.request(|reply| SessionRequest::Add { files, reply }).await?
    }

    pub async fn remove(&self, id: PhotoId) -> Result<bool, SessionError> {
        self.request(|reply| SessionRequest::Remove { id, reply }).await
    }

    pub async fn commit_detections(&self, id: PhotoId, detections: Vec<FaceDetection>) -> Result<bool, SessionError> {
        self.request(|reply| SessionRequest::Commit { id, detections, reply }).await
    }

    pub async fn set_search_target(&self, target: Descriptor) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::SetTarget { target: Some(target), reply }).await
    }

    pub async fn clear_search_target(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::SetTarget { target: None, reply }).await
    }

    pub async fn activate_overlay(&self, id: PhotoId, face: usize) -> Result<Option<Navigation>, SessionError> {
        self.request(|reply| SessionRequest::ActivateOverlay { id, face, reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionRequest::Snapshot { reply }).await
    }

    /// End the session; later requests fail with [`SessionError::ChannelClosed`].
    pub async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionRequest::Close { reply }).await
    }

    /// Current search results.
    pub fn results(&self) -> SearchResultSet {
        self.results.borrow().clone()
    }

    /// Subscribe to search result changes.
    pub fn watch_results(&self) -> watch::Receiver<SearchResultSet> {
        self.results.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)
    }
}

/// Move a session into its own task and return a handle to it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_session(mut session: AlbumSession) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<SessionRequest>(32);
    let (results_tx, results_rx) = watch::channel(session.results.clone());

    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            match req {
                SessionRequest::Add { files, reply } => {
                    let _ = reply.send(session.add(files));
                }
                SessionRequest::Remove { id, reply } => {
                    let removed = session.remove(&id);
                    publish(&results_tx, &session);
                    let _ = reply.send(removed);
                }
                SessionRequest::Commit { id, detections, reply } => {
                    let committed = session.commit_detections(&id, detections);
                    publish(&results_tx, &session);
                    let _ = reply.send(committed);
                }
                SessionRequest::SetTarget { target, reply } => {
                    match target {
                        Some(t) => session.set_search_target(t),
                        None => session.clear_search_target(),
                    }
                    publish(&results_tx, &session);
                    let _ = reply.send(());
                }
                SessionRequest::ActivateOverlay { id, face, reply } => {
                    let navigation = session.activate_overlay(&id, face);
                    publish(&results_tx, &session);
                    let _ = reply.send(navigation);
                }
                SessionRequest::Snapshot { reply } => {
                    let _ = reply.send(session.snapshot());
                }
                SessionRequest::Close { reply } => {
                    session.close();
                    publish(&results_tx, &session);
                    let _ = reply.send(());
                    break;
                }
            }
        }
        tracing::debug!("session task exiting");
    });

    SessionHandle { tx, results: results_rx }
}

/// Push the session's results to watchers, if they changed.
fn publish(tx: &watch::Sender<SearchResultSet>, session: &AlbumSession) {
    tx.send_if_modified(|current| {
        if *current != session.results {
            current.clone_from(&session.results);
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::MemoryPreviews;
    use facealbum_core::FaceBox;

    fn session() -> AlbumSession {
        AlbumSession::new(Box::new(MemoryPreviews::new()), 0.5)
    }

    fn file(name: &str) -> PhotoFile {
        PhotoFile::new(name, vec![1, 2, 3])
    }

    fn det(values: Vec<f32>) -> FaceDetection {
        FaceDetection { bbox: FaceBox::new(1.0, 1.0, 5.0, 5.0), descriptor: Descriptor::new(values) }
    }

    #[test]
    fn test_remove_cascades_to_faces_and_results() {
        let mut s = session();
        let added = s.add(vec![file("a.jpg"), file("b.jpg")]).unwrap();
        let (a, b) = (added[0].id.clone(), added[1].id.clone());
        assert!(s.commit_detections(&a, vec![det(vec![0.0, 0.0])]));
        assert!(s.commit_detections(&b, vec![det(vec![0.1, 0.0])]));

        s.set_search_target(Descriptor::new(vec![0.0, 0.0]));
        assert_eq!(s.results().len(), 2);

        assert!(s.remove(&a));
        assert!(!s.faces().contains(&a));
        assert!(!s.results().contains(&a));
        assert!(s.results().contains(&b));
        assert!(!s.remove(&a));
    }

    #[test]
    fn test_commit_after_remove_is_discarded() {
        let mut s = session();
        let added = s.add(vec![file("a.jpg")]).unwrap();
        let a = added[0].id.clone();
        s.remove(&a);
        assert!(!s.commit_detections(&a, vec![det(vec![0.0])]));
        assert!(s.faces().is_empty());
    }

    #[test]
    fn test_results_follow_index_and_target() {
        let mut s = session();
        let added = s.add(vec![file("a.jpg"), file("b.jpg")]).unwrap();
        let (a, b) = (added[0].id.clone(), added[1].id.clone());

        s.set_search_target(Descriptor::new(vec![1.0, 1.0]));
        assert!(s.results().is_empty());

        // Index change alone triggers recompute.
        s.commit_detections(&b, vec![det(vec![9.0, 9.0]), det(vec![1.0, 1.2])]);
        assert_eq!(s.results().iter().collect::<Vec<_>>(), vec![&b]);

        s.commit_detections(&a, vec![det(vec![5.0, 5.0])]);
        assert_eq!(s.results().len(), 1);

        s.clear_search_target();
        assert!(s.results().is_empty());
        assert!(s.search_target().is_none());
    }

    #[test]
    fn test_activate_overlay() {
        let mut s = session();
        let added = s.add(vec![file("a.jpg"), file("b.jpg")]).unwrap();
        let (a, b) = (added[0].id.clone(), added[1].id.clone());
        s.commit_detections(&a, vec![det(vec![0.3, 0.3]), det(vec![2.0, 2.0])]);
        s.commit_detections(&b, vec![det(vec![2.1, 2.0])]);

        assert_eq!(s.activate_overlay(&a, 1), Some(Navigation::ReturnToCollection));
        assert_eq!(s.search_target().unwrap().values, vec![2.0, 2.0]);
        assert_eq!(s.results().len(), 2);

        assert_eq!(s.activate_overlay(&a, 7), None);
        assert_eq!(s.activate_overlay(&PhotoId::from("missing"), 0), None);
        // A failed activation keeps the previous target.
        assert_eq!(s.search_target().unwrap().values, vec![2.0, 2.0]);
    }

    #[test]
    fn test_close_releases_previews() {
        let mut s = session();
        let added = s.add(vec![file("a.jpg"), file("b.jpg")]).unwrap();
        s.commit_detections(&added[0].id, vec![det(vec![0.0])]);
        assert_eq!(s.live_previews(), 2);
        s.close();
        assert_eq!(s.live_previews(), 0);
        assert!(s.photos().is_empty());
        assert!(s.faces().is_empty());
    }

    #[tokio::test]
    async fn test_handle_roundtrip_and_watch() {
        let handle = spawn_session(session());
        let mut results = handle.watch_results();

        let added = handle.add(vec![file("a.jpg")]).await.unwrap();
        let a = added[0].id.clone();
        assert!(handle.commit_detections(a.clone(), vec![det(vec![0.2, 0.2])]).await.unwrap());
        handle.set_search_target(Descriptor::new(vec![0.2, 0.2])).await.unwrap();

        results.changed().await.unwrap();
        assert!(results.borrow_and_update().contains(&a));
        assert_eq!(handle.results().len(), 1);

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.photos.len(), 1);
        assert_eq!(snap.faces.face_count(), 1);

        assert!(handle.remove(a.clone()).await.unwrap());
        assert!(handle.results().is_empty());

        handle.close().await.unwrap();
        assert!(matches!(handle.snapshot().await, Err(SessionError::ChannelClosed)));
    }
}
