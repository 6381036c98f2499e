//! Scoped storage for inline images referenced by a prompt.
//!
//! The engine reads images from disk, so inline payloads are written to a
//! per-request temporary directory. The directory is owned by the
//! [`ImageArtifacts`] value and removed when it is dropped, which happens
//! once the rendered prompt is no longer needed.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Creates per-request artifact scopes under an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    root: Option<PathBuf>,
}

impl ImageStore {
    /// Store artifacts under `root`, or the system temp directory when `None`.
    pub const fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Start a new, empty artifact scope.
    #[must_use]
    pub fn scope(&self) -> ImageArtifacts {
        ImageArtifacts {
            root: self.root.clone(),
            dir: None,
            paths: Vec::new(),
        }
    }
}

/// Image files written for one request.
#[derive(Debug)]
pub struct ImageArtifacts {
    root: Option<PathBuf>,
    dir: Option<TempDir>,
    paths: Vec<PathBuf>,
}

impl ImageArtifacts {
    /// Write an inline image and return the path the prompt should reference.
    ///
    /// The scope directory is created lazily on the first image.
    pub fn persist(&mut self, media_type: &str, data: &[u8]) -> io::Result<PathBuf> {
        let dir = match &self.dir {
            Some(dir) => dir.path().to_path_buf(),
            None => {
                let created = self.create_dir()?;
                let path = created.path().to_path_buf();
                self.dir = Some(created);
                path
            }
        };

        let path = dir.join(format!(
            "image-{}.{}",
            self.paths.len(),
            extension_for(media_type)
        ));
        std::fs::write(&path, data)?;

        debug!(path = %path.display(), bytes = data.len(), "Persisted inline image");
        self.paths.push(path.clone());
        Ok(path)
    }

    /// Paths written so far, in order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Directory holding the artifacts, if any image was persisted.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn create_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rkserve-images-");
        match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
