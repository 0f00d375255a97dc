//! Incoming files

use std::path::{Path, PathBuf};

use bytes::Bytes;
use cf_processing::Artifact;
use tokio::fs;

use crate::interpolation::split_extension;

/// Where an upload's contents live
#[derive(Debug)]
pub enum UploadBody {
    /// In-memory contents
    Bytes(Bytes),
    /// A file owned by the caller. It is copied, never moved or deleted.
    Path(PathBuf),
    /// A temp file owned by the upload, released when the upload is consumed
    Artifact(Artifact),
}

/// A file offered for assignment
#[derive(Debug)]
pub struct UploadedFile {
    pub original_filename: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub body: UploadBody,
}

impl UploadedFile {
    pub fn new(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            original_filename: Some(original_filename.into()),
            content_type: Some(content_type.into()),
            size: data.len() as u64,
            body: UploadBody::Bytes(data),
        }
    }

    /// Upload a caller-owned file, guessing the content type from its name
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let size = fs::metadata(path).await?.len();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self {
            original_filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            content_type: Some(content_type),
            size,
            body: UploadBody::Path(path.to_path_buf()),
        })
    }

    /// Upload backed by an artifact the upload takes ownership of
    pub fn from_artifact(
        artifact: Artifact,
        original_filename: Option<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            original_filename,
            content_type,
            size: artifact.size(),
            body: UploadBody::Artifact(artifact),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.original_filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// An upload needs both a file name and a content type to be assignable
    pub fn is_assignable(&self) -> bool {
        self.original_filename.is_some() && self.content_type.is_some()
    }

    /// Spool the contents into an artifact owned by the caller of this method
    pub async fn into_artifact(self) -> std::io::Result<Artifact> {
        let extension = self
            .original_filename
            .as_deref()
            .and_then(|name| split_extension(name).1)
            .map(str::to_string);

        match self.body {
            UploadBody::Bytes(data) => Artifact::from_bytes(&data, extension.as_deref()).await,
            UploadBody::Path(path) => Artifact::copy_from(&path).await,
            UploadBody::Artifact(artifact) => Ok(artifact),
        }
    }
}

/// What to assign to an attachment
#[derive(Debug)]
pub enum Upload {
    File(UploadedFile),
    /// Remove the current file
    Clear,
}

impl From<UploadedFile> for Upload {
    fn from(file: UploadedFile) -> Self {
        Self::File(file)
    }
}

impl From<Option<UploadedFile>> for Upload {
    fn from(file: Option<UploadedFile>) -> Self {
        file.map_or(Self::Clear, Self::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bytes_upload() {
        let upload = UploadedFile::new("photo.jpg", "image/jpeg", &b"jpeg data"[..]);
        assert_eq!(upload.size, 9);
        assert!(upload.is_assignable());

        let artifact = upload.into_artifact().await.unwrap();
        assert_eq!(artifact.extension(), Some("jpg"));
        assert_eq!(artifact.size(), 9);
    }

    #[tokio::test]
    async fn test_path_upload_leaves_caller_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let upload = UploadedFile::from_path(&path).await.unwrap();
        assert_eq!(upload.original_filename.as_deref(), Some("report.pdf"));
        assert_eq!(upload.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(upload.size, 8);

        let artifact = upload.into_artifact().await.unwrap();
        drop(artifact);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_content_type_is_not_assignable() {
        let mut upload = UploadedFile::new("photo.jpg", "image/jpeg", Bytes::new());
        upload.content_type = None;
        assert!(!upload.is_assignable());
    }

    #[test]
    fn test_none_clears() {
        assert!(matches!(Upload::from(None), Upload::Clear));
    }
}
