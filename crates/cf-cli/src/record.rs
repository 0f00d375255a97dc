//! Host records persisted as JSON documents

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use cf_core::{AttachmentColumns, HostRecord, Id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub field: String,
    pub message: String,
}

/// A host record stored in a JSON file
///
/// ```json
/// {
///   "model": "User",
///   "id": 7,
///   "attachments": {
///     "avatar": { "file_name": "photo.jpg", "content_type": "image/jpeg", "file_size": 2048, "updated_at": null }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    pub model: String,
    pub id: Option<Id>,
    #[serde(default)]
    pub attachments: BTreeMap<String, AttachmentColumns>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
}

impl RecordFile {
    pub fn new(model: impl Into<String>, id: Option<Id>) -> Self {
        Self {
            model: model.into(),
            id,
            ..Default::default()
        }
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read record {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("record {} is not valid JSON", path.display()))
    }

    /// Load the record, or start a new one when the file does not exist yet
    pub async fn load_or_create(
        path: &Path,
        model: Option<&str>,
        id: Option<Id>,
    ) -> anyhow::Result<Self> {
        if tokio::fs::try_exists(path).await? {
            let mut record = Self::load(path).await?;
            if id.is_some() {
                record.id = id;
            }
            return Ok(record);
        }

        let model = model.with_context(|| {
            format!("record {} does not exist; pass --model to create it", path.display())
        })?;
        Ok(Self::new(model, id))
    }

    pub async fn store(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("failed to write record {}", path.display()))
    }

    /// Make sure the record carries columns for the attachment
    pub fn ensure_attachment(&mut self, name: &str) {
        self.attachments.entry(name.to_string()).or_default();
    }
}

impl HostRecord for RecordFile {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn columns(&self, attachment: &str) -> Option<&AttachmentColumns> {
        self.attachments.get(attachment)
    }

    fn columns_mut(&mut self, attachment: &str) -> Option<&mut AttachmentColumns> {
        self.attachments.get_mut(attachment)
    }

    fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(RecordError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}
