//! Host record used by the unit tests

use std::collections::HashMap;

use cf_core::{AttachmentColumns, HostRecord, Id};

#[derive(Debug, Default)]
pub struct TestHost {
    pub model: String,
    pub id: Option<Id>,
    pub columns: HashMap<String, AttachmentColumns>,
    pub errors: Vec<(String, String)>,
}

impl TestHost {
    pub fn new(model: &str, id: Option<Id>) -> Self {
        Self {
            model: model.to_string(),
            id,
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, name: &str) -> Self {
        self.columns.insert(name.to_string(), AttachmentColumns::new());
        self
    }

    pub fn with_file(mut self, name: &str, file_name: &str) -> Self {
        let columns = self.columns.entry(name.to_string()).or_default();
        columns.file_name = Some(file_name.to_string());
        self
    }
}

impl HostRecord for TestHost {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn columns(&self, attachment: &str) -> Option<&AttachmentColumns> {
        self.columns.get(attachment)
    }

    fn columns_mut(&mut self, attachment: &str) -> Option<&mut AttachmentColumns> {
        self.columns.get_mut(attachment)
    }

    fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push((field.to_string(), message.to_string()));
    }
}
