//! Spooled file artifacts
//!
//! Every pending file (an upload's original, each derived style, every
//! intermediate pipeline stage) lives in a temp file owned by an [`Artifact`].
//! Dropping the artifact deletes the file, so no exit path leaks temp files.

use std::io;
use std::path::Path;

use bytes::Bytes;
use tempfile::TempPath;
use tokio::fs;

const PREFIX: &str = "clipfile-";

/// A temp file holding one version of an attachment
#[derive(Debug)]
pub struct Artifact {
    path: TempPath,
    size: u64,
}

impl Artifact {
    /// Reserve an empty temp file, typically as a processor's output target
    pub fn reserve(extension: Option<&str>) -> io::Result<Self> {
        let suffix = extension
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(&suffix)
            .tempfile()?;

        Ok(Self {
            path: file.into_temp_path(),
            size: 0,
        })
    }

    /// Spool bytes into a new artifact
    pub async fn from_bytes(data: &[u8], extension: Option<&str>) -> io::Result<Self> {
        let artifact = Self::reserve(extension)?;
        fs::write(artifact.path(), data).await?;
        artifact.refresh().await
    }

    /// Copy a caller-owned file into a new artifact. The source is left untouched.
    pub async fn copy_from(source: &Path) -> io::Result<Self> {
        let extension = source.extension().and_then(|ext| ext.to_str());
        let artifact = Self::reserve(extension)?;
        fs::copy(source, artifact.path()).await?;
        artifact.refresh().await
    }

    /// Re-read the size after an external program wrote the file
    pub async fn refresh(mut self) -> io::Result<Self> {
        self.size = fs::metadata(self.path()).await?.len();
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// File extension of the spooled file, without the dot
    pub fn extension(&self) -> Option<&str> {
        self.path().extension().and_then(|ext| ext.to_str())
    }

    /// File name without extension, used in error messages
    pub fn basename(&self) -> String {
        self.path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        Ok(Bytes::from(fs::read(self.path()).await?))
    }
}
