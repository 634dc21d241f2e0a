//! facealbum-session — Album authoring session.
//!
//! Owns the staged photos of an album-in-progress, runs face detection on
//! new photos through a dedicated model engine thread, and keeps the face
//! search results in sync with both.

pub mod collection;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod preview;
pub mod readiness;
pub mod session;

pub use collection::{slugify, PhotoCollection, PhotoFile, StagedPhoto};
pub use config::{Config, ConfigError};
pub use engine::{spawn_engine, spawn_onnx_engine, EngineError, EngineHandle};
pub use pipeline::{BatchReport, DetectionPipeline, StagedBatch};
pub use preview::{MemoryPreviews, PreviewError, PreviewStore, ThumbnailPreviews};
pub use readiness::{ReadinessError, ReadinessGate, ReadyState};
pub use session::{spawn_session, AlbumSession, SessionError, SessionHandle, SessionSnapshot};
