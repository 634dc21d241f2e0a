use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facealbum_core::{geometry, ImageDimensions};
use facealbum_session::{
    spawn_onnx_engine, spawn_session, AlbumSession, Config, DetectionPipeline, PhotoFile, StagedPhoto,
    ThumbnailPreviews,
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facealbum", about = "Stage album photos and find people across them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in photos and print them as JSON
    Scan {
        /// Photo files to stage
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Find the photos containing the person from a reference photo
    Find {
        /// Photo containing the person to look for
        #[arg(short, long)]
        reference: PathBuf,
        /// Which face of the reference photo to use (detector order)
        #[arg(short, long, default_value_t = 0)]
        face: usize,
        /// Photo files to search
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print face boxes projected onto a rendered image size
    Overlay {
        file: PathBuf,
        /// Rendered width in pixels
        #[arg(long)]
        width: f32,
        /// Rendered height in pixels
        #[arg(long)]
        height: f32,
    },
    /// Show configuration and model status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    match cli.command {
        Commands::Scan { files } => {
            let pipeline = open_pipeline(&config).await?;
            let photos = stage_and_detect(&pipeline, &files).await?;
            let snap = pipeline.session().snapshot().await?;

            let out: Vec<_> = photos
                .iter()
                .map(|p| {
                    let faces = snap.faces.get(&p.id).unwrap_or_default();
                    json!({
                        "id": p.id,
                        "name": p.file.name(),
                        "preview": p.preview_uri,
                        "faces": faces.iter().map(|f| f.bbox).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
            pipeline.session().close().await?;
        }
        Commands::Find { reference, face, files } => {
            let pipeline = open_pipeline(&config).await?;
            let mut all = vec![reference];
            all.extend(files);
            let photos = stage_and_detect(&pipeline, &all).await?;
            let target = photos[0].id.clone();

            let session = pipeline.session();
            if session.activate_overlay(target.clone(), face).await?.is_none() {
                let found = session.snapshot().await?.faces.get(&target).map_or(0, |f| f.len());
                bail!("reference photo has {found} face(s); face {face} does not exist");
            }

            let results = session.results();
            let matches: Vec<_> = photos
                .iter()
                .filter(|p| results.contains(&p.id))
                .map(|p| json!({ "id": p.id, "name": p.file.name() }))
                .collect();
            let count = matches.len();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "reference": target,
                    "face": face,
                    "threshold": config.match_threshold,
                    "matches": matches,
                }))?
            );
            println!("Found this person in {count} photo{}.", if count == 1 { "" } else { "s" });
            session.close().await?;
        }
        Commands::Overlay { file, width, height } => {
            let pipeline = open_pipeline(&config).await?;
            let photos = stage_and_detect(&pipeline, &[file]).await?;
            let photo = &photos[0];

            let image = image::load_from_memory(photo.file.bytes())
                .with_context(|| format!("decoding {}", photo.file.name()))?;
            let dims = ImageDimensions::new(width, height, image.width() as f32, image.height() as f32);

            let snap = pipeline.session().snapshot().await?;
            let detections = snap.faces.get(&photo.id).unwrap_or_default();
            let overlays = geometry::overlays(detections, &dims);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "id": photo.id,
                    "dimensions": dims,
                    "overlays": overlays,
                }))?
            );
            pipeline.session().close().await?;
        }
        Commands::Status => {
            let detector = config.detector_model_path();
            let recognizer = config.recognizer_model_path();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "config": config,
                    "models": {
                        "detector": { "path": detector, "present": detector.exists() },
                        "recognizer": { "path": recognizer, "present": recognizer.exists() },
                    },
                }))?
            );
        }
    }

    Ok(())
}

/// Start a session and a model engine, waiting for the models to load.
async fn open_pipeline(config: &Config) -> Result<DetectionPipeline> {
    let previews = ThumbnailPreviews::new(&config.preview_dir, config.thumbnail_size)
        .context("preparing preview directory")?;
    let session = spawn_session(AlbumSession::new(Box::new(previews), config.match_threshold));

    let engine = spawn_onnx_engine(config)?;
    engine
        .readiness()
        .wait()
        .await
        .with_context(|| format!("face models unavailable in {}", config.model_dir.display()))?;

    Ok(DetectionPipeline::new(session, engine, config.defer_until_ready))
}

/// Stage the given files and wait for their detection batch to finish.
async fn stage_and_detect(pipeline: &DetectionPipeline, paths: &[PathBuf]) -> Result<Vec<StagedPhoto>> {
    let files = paths
        .iter()
        .map(|p| PhotoFile::open(p).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let batch = pipeline.stage(files).await?;
    match batch.detection {
        Some(detection) => {
            let report = detection.await.context("detection task panicked")?;
            tracing::info!(
                committed = report.committed,
                failed = report.failed,
                "detection finished"
            );
        }
        None => tracing::warn!("face models not ready; photos staged without detection"),
    }
    Ok(batch.photos)
}

