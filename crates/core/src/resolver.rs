use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub const ROTATION_ANGLE_KEY: &str = "rotation-angle";
pub const OUTPUT_PATH_KEY: &str = "output-path";
pub const DEFAULT_ROTATION_ANGLE: &str = "90";

/// Everything needed to rotate one image. Built per notification, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub rotation_angle: String,
}

impl ProcessingRequest {
    pub fn resolve(
        metadata: &HashMap<String, String>,
        source: PathBuf,
        image_name: &str,
        fallback_dir: &Path,
    ) -> Self {
        Self {
            source,
            destination: resolve_destination(metadata, image_name, fallback_dir),
            rotation_angle: resolve_rotation_angle(metadata),
        }
    }
}

/// The angle is forwarded as-is; no numeric validation happens here.
pub fn resolve_rotation_angle(metadata: &HashMap<String, String>) -> String {
    metadata
        .get(ROTATION_ANGLE_KEY)
        .cloned()
        .unwrap_or_else(|| DEFAULT_ROTATION_ANGLE.to_string())
}

pub fn resolve_destination(
    metadata: &HashMap<String, String>,
    image_name: &str,
    fallback_dir: &Path,
) -> PathBuf {
    let file_name = format!("rotated_{}", image_name);
    match metadata.get(OUTPUT_PATH_KEY) {
        Some(output_path) => Path::new(output_path).join(file_name),
        None => fallback_dir.join(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn angle_defaults_to_ninety() {
        assert_eq!(resolve_rotation_angle(&HashMap::new()), "90");
        assert_eq!(
            resolve_rotation_angle(&metadata(&[("output-path", "/data/out")])),
            "90"
        );
    }

    #[test]
    fn angle_is_not_validated() {
        assert_eq!(
            resolve_rotation_angle(&metadata(&[("rotation-angle", "sideways")])),
            "sideways"
        );
    }

    #[test]
    fn output_path_from_metadata() {
        let dest = resolve_destination(
            &metadata(&[("output-path", "/data/out")]),
            "photo1.png",
            Path::new("/home/me"),
        );
        assert_eq!(dest, PathBuf::from("/data/out/rotated_photo1.png"));
    }

    #[test]
    fn lookups_are_independent() {
        let request = ProcessingRequest::resolve(
            &metadata(&[("rotation-angle", "180")]),
            PathBuf::from("/scratch/pic.png"),
            "pic.png",
            Path::new("/home/me"),
        );

        assert_eq!(request.rotation_angle, "180");
        assert_eq!(request.destination, PathBuf::from("/home/me/rotated_pic.png"));
    }
}
