//! Program image files
//!
//! Images are stored as JSON wrapped in a small versioned envelope so the
//! external code generator and the CLI agree on the format.

use super::Assembly;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current image format version
pub const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to access image: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed image: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
}

#[derive(Serialize)]
struct ImageRef<'a> {
    version: u32,
    assembly: &'a Assembly,
}

#[derive(Deserialize)]
struct ImageOwned {
    version: u32,
    assembly: Assembly,
}

impl Assembly {
    pub fn to_json(&self) -> Result<String, ImageError> {
        let image = ImageRef {
            version: IMAGE_VERSION,
            assembly: self,
        };
        Ok(serde_json::to_string_pretty(&image)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let image: ImageOwned = serde_json::from_str(text)?;
        if image.version != IMAGE_VERSION {
            return Err(ImageError::VersionMismatch {
                found: image.version,
                expected: IMAGE_VERSION,
            });
        }
        Ok(image.assembly)
    }

    /// Read an image file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write an image file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ImageError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
