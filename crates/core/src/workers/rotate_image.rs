use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    events::StorageEvent,
    processor::ImageProcessor,
    resolver::{DEFAULT_ROTATION_ANGLE, OUTPUT_PATH_KEY, ProcessingRequest, ROTATION_ANGLE_KEY},
    scratch::{get_default_output_dir, get_root_scratch_dir, get_scratch_dir},
    storage::ObjectStore,
    workers::{Outcome, Worker},
};

#[derive(Debug, Clone)]
pub struct RotateImageConfig {
    /// Root under which per-delivery download directories are created.
    pub scratch_root: PathBuf,
    /// Used when the object has no `output-path` metadata.
    pub output_dir: PathBuf,
}

impl Default for RotateImageConfig {
    fn default() -> Self {
        Self {
            scratch_root: get_root_scratch_dir(),
            output_dir: get_default_output_dir(),
        }
    }
}

/// Fetches finalized objects, resolves rotation parameters from their metadata
/// and hands them to the remote processor.
pub struct RotateImageWorker {
    store: Arc<dyn ObjectStore>,
    processor: Arc<dyn ImageProcessor>,
    config: RotateImageConfig,
}

impl RotateImageWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Arc<dyn ImageProcessor>,
        config: RotateImageConfig,
    ) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    async fn rotate(&self, event: &StorageEvent, scratch_dir: PathBuf) -> Result<ProcessingRequest> {
        let image_name = event.image_name();
        tokio::fs::create_dir_all(&scratch_dir).await?;
        let source = scratch_dir.join(image_name);

        self.store
            .download(&event.bucket_id, &event.object_id, &source)
            .await?;

        let metadata = self
            .store
            .custom_metadata(&event.bucket_id, &event.object_id)
            .await?;

        match metadata.get(ROTATION_ANGLE_KEY) {
            Some(angle) => info!(image = image_name, angle = %angle, "Rotation angle found"),
            None => info!(
                image = image_name,
                "No rotation angle found, using default {}", DEFAULT_ROTATION_ANGLE
            ),
        }
        match metadata.get(OUTPUT_PATH_KEY) {
            Some(path) => info!(image = image_name, output_path = %path, "Output path found"),
            None => info!(image = image_name, "No output path found, using default path"),
        }

        let request =
            ProcessingRequest::resolve(&metadata, source, image_name, &self.config.output_dir);

        self.processor
            .rotate(&request.source, &request.destination, &request.rotation_angle)
            .await?;

        Ok(request)
    }
}

#[async_trait]
impl Worker for RotateImageWorker {
    const WORKER_ID: &'static str = "image.rotate";

    async fn handle(&self, event: &StorageEvent) -> Outcome {
        if !event.is_finalize() {
            debug!(
                event_type = %event.event_type,
                object = %event.object_id,
                "Ignoring notification"
            );
            return Outcome::Ignored;
        }

        let image_name = event.image_name();
        // "." and ".." would resolve the fallback destination outside the output directory.
        if matches!(image_name, "" | "." | "..") {
            warn!(object = %event.object_id, "Object id has no usable file name, skipping");
            return Outcome::PermanentFailure(format!(
                "object id {} has no usable file name",
                event.object_id
            ));
        }

        let scratch_dir = get_scratch_dir(&self.config.scratch_root, event);
        let result = self.rotate(event, scratch_dir.clone()).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch_dir).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %scratch_dir.display(), error = %e, "Failed to clean scratch directory");
        }

        match result {
            Ok(request) => {
                info!(
                    worker = Self::WORKER_ID,
                    image = image_name,
                    destination = %request.destination.display(),
                    "Image rotated"
                );
                Outcome::Processed
            }
            Err(e) => {
                error!(
                    worker = Self::WORKER_ID,
                    image = image_name,
                    error = %e,
                    "Error processing image"
                );
                Outcome::from_error(&e)
            }
        }
    }
}
