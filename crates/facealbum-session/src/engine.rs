use crate::config::Config;
use crate::readiness::ReadinessGate;
use facealbum_core::{BackendError, FaceBackend, OnnxBackend, RawFace};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("model runtime is not ready")]
    NotReady,
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from the pipeline to the engine thread.
enum EngineRequest {
    Detect {
        image: std::sync::Arc<[u8]>,
        reply: oneshot::Sender<Result<Vec<RawFace>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    readiness: ReadinessGate,
}

impl EngineHandle {
    /// Run face detection + embedding over encoded image bytes.
    pub async fn detect(&self, image: std::sync::Arc<[u8]>) -> Result<Vec<RawFace>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Close the readiness gate. The thread exits once every handle is dropped.
    pub fn shutdown(&self) {
        self.readiness.close();
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// `load` runs on the engine thread, so photos can be staged while models
/// are still loading. The readiness gate opens when it returns `Ok`; on
/// failure the gate records the error and every request is refused.
pub fn spawn_engine<B, F>(load: F) -> Result<EngineHandle, EngineError>
where
    B: FaceBackend + 'static,
    F: FnOnce() -> Result<B, BackendError> + Send + 'static,
{
    let readiness = ReadinessGate::new();
    let gate = readiness.clone();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facealbum-engine".into())
        .spawn(move || {
            let mut backend = match load() {
                Ok(backend) => {
                    tracing::info!("face models loaded");
                    gate.mark_ready();
                    Some(backend)
                }
                Err(e) => {
                    tracing::error!(error = %e, "face models failed to load; detection disabled");
                    gate.mark_failed(e.to_string());
                    None
                }
            };

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let result = match backend.as_mut() {
                            Some(b) => b.detect(&image).map_err(EngineError::from),
                            None => Err(EngineError::NotReady),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, readiness })
}

/// Spawn an engine backed by the SCRFD + ArcFace ONNX models named in `config`.
pub fn spawn_onnx_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let detector = config.detector_model_path();
    let recognizer = config.recognizer_model_path();
    let confidence = config.detect_confidence;
    spawn_engine(move || OnnxBackend::load(&detector, &recognizer, confidence))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use facealbum_core::BoundingBox;
    use std::sync::Arc;

    /// Test backend: bytes starting with `fail` error out, otherwise each byte
    /// becomes one face whose descriptor is `[byte / 10.0]`.
    pub(crate) struct ScriptedBackend;

    impl FaceBackend for ScriptedBackend {
        fn detect(&mut self, image: &[u8]) -> Result<Vec<RawFace>, BackendError> {
            if image.starts_with(b"fail") {
                return Err(BackendError::Runtime("corrupt image".into()));
            }
            if image.starts_with(b"nan") {
                return Ok(vec![RawFace {
                    bbox: BoundingBox {
                        x: f32::NAN, y: 0.0, width: 1.0, height: 1.0, confidence: 0.9, landmarks: None,
                    },
                    descriptor: vec![0.0],
                    model_version: None,
                }]);
            }
            Ok(image
                .iter()
                .enumerate()
                .map(|(i, &b)| RawFace {
                    bbox: BoundingBox {
                        x: i as f32 * 10.0, y: 0.0, width: 8.0, height: 8.0, confidence: 0.9, landmarks: None,
                    },
                    descriptor: vec![b as f32 / 10.0],
                    model_version: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_engine_detects_after_ready() {
        let engine = spawn_engine(|| Ok(ScriptedBackend)).unwrap();
        engine.readiness().wait().await.unwrap();
        let faces = engine.detect(Arc::from(&[1u8, 2][..])).await.unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1].descriptor, vec![0.2]);
    }

    #[tokio::test]
    async fn test_engine_propagates_backend_error() {
        let engine = spawn_engine(|| Ok(ScriptedBackend)).unwrap();
        let err = engine.detect(Arc::from(&b"fail"[..])).await.unwrap_err();
        assert!(matches!(err, EngineError::Backend(BackendError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_engine_load_failure() {
        let engine = spawn_engine(|| -> Result<ScriptedBackend, BackendError> {
            Err(BackendError::Runtime("no models".into()))
        })
        .unwrap();
        assert!(engine.readiness().wait().await.is_err());
        assert!(!engine.is_ready());
        let err = engine.detect(Arc::from(&[1u8][..])).await.unwrap_err();
        assert!(matches!(err, EngineError::NotReady));
    }
}
