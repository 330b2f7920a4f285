//! Input images for blend jobs.

use std::path::{Path, PathBuf};

use base64::Engine;

use crate::error::{CellCoverError, Result};
use crate::vendor::BlendDimensions;

pub const BLEND_CONCEPT: &str = "blend";
pub const MIN_BLEND_IMAGES: usize = 2;
pub const MAX_BLEND_IMAGES: usize = 5;

const FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, Default)]
pub struct BlendParams {
    pub images: Vec<PathBuf>,
    pub dimensions: Option<BlendDimensions>,
}

impl BlendParams {
    pub fn new(images: Vec<PathBuf>) -> Self {
        Self {
            images,
            dimensions: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if (MIN_BLEND_IMAGES..=MAX_BLEND_IMAGES).contains(&self.images.len()) {
            Ok(())
        } else {
            Err(CellCoverError::BlendImageCount(self.images.len()))
        }
    }

    /// Prompt recorded for the job, e.g. `blend: a.png, b.png`.
    pub fn prompt(&self) -> String {
        let names: Vec<String> = self
            .images
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect();
        format!("blend: {}", names.join(", "))
    }
}

/// Reads `path` into a `data:` URI. Files whose type is not an image are
/// sent as PNG with a warning.
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| CellCoverError::ReadImage {
        path: path.to_path_buf(),
        source,
    })?;

    let mime = match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::IMAGE => mime.to_string(),
        other => {
            log::warn!(
                "{:?} does not look like an image ({:?}); sending as {}",
                path,
                other,
                FALLBACK_MIME
            );
            FALLBACK_MIME.to_string()
        }
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_image_as_data_uri() {
        let temp_dir = TempDir::new().unwrap();
        let jpg = temp_dir.path().join("cat.jpg");
        std::fs::write(&jpg, b"abc").unwrap();
        let txt = temp_dir.path().join("notes.txt");
        std::fs::write(&txt, b"abc").unwrap();

        assert_eq!(encode_image(&jpg).unwrap(), "data:image/jpeg;base64,YWJj");
        assert_eq!(encode_image(&txt).unwrap(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_encode_missing_image() {
        let err = encode_image(Path::new("/nonexistent/cat.png")).unwrap_err();
        assert!(matches!(err, CellCoverError::ReadImage { .. }));
    }

    #[test]
    fn test_image_count_bounds() {
        let paths = |n: usize| (0..n).map(|i| PathBuf::from(format!("{}.png", i))).collect();
        assert!(BlendParams::new(paths(1)).validate().is_err());
        assert!(BlendParams::new(paths(2)).validate().is_ok());
        assert!(BlendParams::new(paths(5)).validate().is_ok());
        assert!(matches!(
            BlendParams::new(paths(6)).validate(),
            Err(CellCoverError::BlendImageCount(6))
        ));
    }

    #[test]
    fn test_prompt_lists_file_names() {
        let params = BlendParams::new(vec![
            PathBuf::from("/tmp/in/a.png"),
            PathBuf::from("b.jpg"),
        ]);
        assert_eq!(params.prompt(), "blend: a.png, b.jpg");
    }
}
