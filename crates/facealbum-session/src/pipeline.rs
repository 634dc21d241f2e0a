//! Face detection pipeline: turns newly staged photos into face detections
//! without blocking staging.

use crate::collection::{PhotoFile, StagedPhoto};
use crate::engine::{EngineError, EngineHandle};
use crate::session::{SessionError, SessionHandle};
use facealbum_core::{ingest, FaceDetection, IngestError};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
enum DetectError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("malformed detector output: {0}")]
    Ingest(#[from] IngestError),
}

/// Outcome of one detection batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Photos whose result was written to the index (including empty results).
    pub committed: usize,
    /// Results dropped because the photo was removed mid-detection.
    pub discarded: usize,
    /// Photos whose detection failed and were recorded with no faces.
    pub failed: usize,
    /// Whether the batch was skipped because the model runtime was not ready.
    pub skipped: bool,
}

/// Photos just staged, and the detection batch started for them (if any).
pub struct StagedBatch {
    pub photos: Vec<StagedPhoto>,
    pub detection: Option<JoinHandle<BatchReport>>,
}

/// Connects the session to the model runtime.
#[derive(Clone)]
pub struct DetectionPipeline {
    session: SessionHandle,
    engine: EngineHandle,
    defer_until_ready: bool,
}

impl DetectionPipeline {
    pub fn new(session: SessionHandle, engine: EngineHandle, defer_until_ready: bool) -> Self {
        Self { session, engine, defer_until_ready }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Stage files and start detection for the new photos only.
    ///
    /// Returns as soon as the photos are staged; detection runs in the
    /// background and commits each photo's faces as it finishes.
    pub async fn stage(&self, files: Vec<PhotoFile>) -> Result<StagedBatch, SessionError> {
        let photos = self.session.add(files).await?;
        let detection = self.spawn_batch(photos.clone());
        Ok(StagedBatch { photos, detection })
    }

    /// Start a detection batch, subject to the readiness policy.
    ///
    /// Without `defer_until_ready`, a batch staged before the models are
    /// loaded is skipped and never retried.
    pub fn spawn_batch(&self, photos: Vec<StagedPhoto>) -> Option<JoinHandle<BatchReport>> {
        if photos.is_empty() {
            return None;
        }
        if !self.defer_until_ready && !self.engine.is_ready() {
            tracing::debug!(photos = photos.len(), "face models not ready; skipping detection");
            return None;
        }
        let pipeline = self.clone();
        Some(tokio::spawn(async move { pipeline.process_batch(photos).await }))
    }

    /// Detect faces photo by photo, in order.
    ///
    /// Photo N+1 is not started until photo N's result has been committed.
    pub async fn process_batch(&self, photos: Vec<StagedPhoto>) -> BatchReport {
        let mut report = BatchReport::default();

        if let Err(e) = self.engine.readiness().wait().await {
            tracing::debug!(error = %e, photos = photos.len(), "skipping detection batch");
            report.skipped = true;
            return report;
        }

        tracing::info!(photos = photos.len(), "detecting faces in new photos");
        for photo in &photos {
            let detections = match self.detect_faces(photo).await {
                Ok(detections) => detections,
                Err(e) => {
                    tracing::warn!(photo = %photo.id, name = photo.file.name(), error = %e, "face detection failed");
                    report.failed += 1;
                    Vec::new()
                }
            };
            let faces = detections.len();

            match self.session.commit_detections(photo.id.clone(), detections).await {
                Ok(true) => {
                    tracing::debug!(photo = %photo.id, faces, "faces committed");
                    report.committed += 1;
                }
                Ok(false) => report.discarded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "session closed during detection");
                    break;
                }
            }
        }

        tracing::info!(
            committed = report.committed,
            failed = report.failed,
            discarded = report.discarded,
            "face detection batch complete"
        );
        report
    }

    async fn detect_faces(&self, photo: &StagedPhoto) -> Result<Vec<FaceDetection>, DetectError> {
        let raw = self.engine.detect(photo.file.shared_bytes()).await?;
        Ok(ingest(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::engine::tests::ScriptedBackend;
    use crate::preview::MemoryPreviews;
    use crate::session::{spawn_session, AlbumSession};
    use facealbum_core::{BackendError, Descriptor, PhotoId};
    use std::sync::mpsc as std_mpsc;

    fn session() -> SessionHandle {
        spawn_session(AlbumSession::new(Box::new(MemoryPreviews::new()), 0.5))
    }

    async fn ready_engine() -> EngineHandle {
        let engine = spawn_engine(|| Ok(ScriptedBackend)).unwrap();
        engine.readiness().wait().await.unwrap();
        engine
    }

    /// Engine whose model load blocks until `release` is signalled.
    fn gated_engine() -> (EngineHandle, std_mpsc::Sender<()>) {
        let (release, wait) = std_mpsc::channel::<()>();
        let engine = spawn_engine(move || {
            let _ = wait.recv();
            Ok::<_, BackendError>(ScriptedBackend)
        })
        .unwrap();
        (engine, release)
    }

    #[tokio::test]
    async fn test_batch_isolates_failure() {
        let pipeline = DetectionPipeline::new(session(), ready_engine().await, false);
        let batch = pipeline
            .stage(vec![
                PhotoFile::new("one.jpg", vec![1, 2]),
                PhotoFile::new("two.jpg", b"fail".to_vec()),
                PhotoFile::new("three.jpg", vec![3]),
            ])
            .await
            .unwrap();

        let report = batch.detection.unwrap().await.unwrap();
        assert_eq!(report, BatchReport { committed: 3, discarded: 0, failed: 1, skipped: false });

        let snap = pipeline.session().snapshot().await.unwrap();
        let ids: Vec<PhotoId> = batch.photos.iter().map(|p| p.id.clone()).collect();
        assert_eq!(snap.faces.get(&ids[0]).unwrap().len(), 2);
        assert_eq!(snap.faces.get(&ids[1]).unwrap().len(), 0);
        assert_eq!(snap.faces.get(&ids[2]).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_output_recorded_empty() {
        let pipeline = DetectionPipeline::new(session(), ready_engine().await, false);
        let batch = pipeline.stage(vec![PhotoFile::new("odd.jpg", b"nan".to_vec())]).await.unwrap();
        let report = batch.detection.unwrap().await.unwrap();
        assert_eq!(report.failed, 1);

        let snap = pipeline.session().snapshot().await.unwrap();
        assert_eq!(snap.faces.get(&batch.photos[0].id), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_only_new_photos_detected() {
        let pipeline = DetectionPipeline::new(session(), ready_engine().await, false);
        let first = pipeline.stage(vec![PhotoFile::new("a.jpg", vec![1])]).await.unwrap();
        first.detection.unwrap().await.unwrap();

        let second = pipeline.stage(vec![PhotoFile::new("b.jpg", vec![4, 5])]).await.unwrap();
        let report = second.detection.unwrap().await.unwrap();
        assert_eq!(report.committed, 1);

        let snap = pipeline.session().snapshot().await.unwrap();
        assert_eq!(snap.faces.len(), 2);
        assert_eq!(snap.faces.face_count(), 3);
    }

    #[tokio::test]
    async fn test_not_ready_skips_batch() {
        let (engine, release) = gated_engine();
        let pipeline = DetectionPipeline::new(session(), engine, false);

        let batch = pipeline.stage(vec![PhotoFile::new("early.jpg", vec![1])]).await.unwrap();
        assert!(batch.detection.is_none());
        assert_eq!(pipeline.session().snapshot().await.unwrap().photos.len(), 1);

        release.send(()).unwrap();
        pipeline.engine().readiness().wait().await.unwrap();
        let snap = pipeline.session().snapshot().await.unwrap();
        assert!(snap.faces.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_batch_waits_for_ready() {
        let (engine, release) = gated_engine();
        let pipeline = DetectionPipeline::new(session(), engine, true);

        let batch = pipeline.stage(vec![PhotoFile::new("early.jpg", vec![1])]).await.unwrap();
        let detection = batch.detection.unwrap();

        release.send(()).unwrap();
        let report = detection.await.unwrap();
        assert_eq!(report.committed, 1);
    }

    #[tokio::test]
    async fn test_load_failure_skips_deferred_batch() {
        let engine = spawn_engine(|| -> Result<ScriptedBackend, BackendError> {
            Err(BackendError::Runtime("no models".into()))
        })
        .unwrap();
        let pipeline = DetectionPipeline::new(session(), engine, true);
        let batch = pipeline.stage(vec![PhotoFile::new("a.jpg", vec![1])]).await.unwrap();
        let report = batch.detection.unwrap().await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.committed, 0);
    }

    #[tokio::test]
    async fn test_removed_photo_result_discarded() {
        let pipeline = DetectionPipeline::new(session(), ready_engine().await, false);
        let photos = pipeline
            .session()
            .add(vec![PhotoFile::new("gone.jpg", vec![1]), PhotoFile::new("kept.jpg", vec![2])])
            .await
            .unwrap();

        // Removed after staging, before its detection is committed.
        pipeline.session().remove(photos[0].id.clone()).await.unwrap();
        let report = pipeline.process_batch(photos.clone()).await;
        assert_eq!(report.discarded, 1);
        assert_eq!(report.committed, 1);

        let snap = pipeline.session().snapshot().await.unwrap();
        assert!(!snap.faces.contains(&photos[0].id));
        assert!(snap.faces.contains(&photos[1].id));
    }

    #[tokio::test]
    async fn test_search_sees_detections() {
        let pipeline = DetectionPipeline::new(session(), ready_engine().await, false);
        let batch = pipeline
            .stage(vec![
                PhotoFile::new("a.jpg", vec![10]),
                PhotoFile::new("b.jpg", vec![30, 12]),
                PhotoFile::new("c.jpg", vec![50]),
            ])
            .await
            .unwrap();
        batch.detection.unwrap().await.unwrap();

        // Descriptor [1.0] from byte 10; [1.2] is within 0.5, [3.0] and [5.0] are not.
        let session = pipeline.session();
        let nav = session.activate_overlay(batch.photos[0].id.clone(), 0).await.unwrap();
        assert!(nav.is_some());
        let results = session.results();
        assert!(results.contains(&batch.photos[0].id));
        assert!(results.contains(&batch.photos[1].id));
        assert!(!results.contains(&batch.photos[2].id));

        session.set_search_target(Descriptor::new(vec![5.0])).await.unwrap();
        assert_eq!(session.results().into_iter().collect::<Vec<_>>(), vec![batch.photos[2].id.clone()]);
    }
}
