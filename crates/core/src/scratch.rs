use std::{
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::events::StorageEvent;

pub fn get_root_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rotator")
        .join("scratch")
}

/// Directory where rotated images land when the object carries no `output-path`.
pub fn get_default_output_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Per-delivery scratch directory, keyed by bucket, object and generation.
///
/// The random suffix keeps concurrent redeliveries of the same notification apart.
pub fn get_scratch_dir(root: &Path, event: &StorageEvent) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    event.bucket_id.hash(&mut hasher);
    event.object_id.hash(&mut hasher);
    event.generation.hash(&mut hasher);
    let key = hasher.finish();

    root.join(format!("{:016x}-{}", key, Uuid::new_v4().simple()))
}
