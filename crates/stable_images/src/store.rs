use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::debug;

use crate::{response::Seed, Result};

const DEFAULT_IMAGE_DIR: &str = "images";

/// The kind of generation an image came from, used as the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Img2Img,
    Txt2Img,
}

impl Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Img2Img => write!(f, "img2img"),
            Self::Txt2Img => write!(f, "txt2img"),
        }
    }
}

/// An image that has been written to disk
#[derive(Debug, Clone)]
pub struct SavedImage {
    pub kind: ImageKind,
    pub seed: Seed,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Writes generated images into a directory, one file per kind and seed
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DIR)
    }
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path an image of the given kind and seed is stored at
    pub fn path_for(&self, kind: ImageKind, seed: &Seed) -> PathBuf {
        self.root.join(format!("{kind}_{seed}.png"))
    }

    /// Write the image bytes, creating the directory if needed. Saving the same
    /// kind and seed again replaces the earlier file.
    pub async fn save(&self, kind: ImageKind, seed: Seed, bytes: Vec<u8>) -> Result<SavedImage> {
        fs::create_dir_all(&self.root).await?;

        let path = self.path_for(kind, &seed);
        fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "image written");

        Ok(SavedImage {
            kind,
            seed,
            path,
            bytes,
        })
    }
}
