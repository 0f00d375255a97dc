//! Attachment declarations

use std::collections::BTreeMap;

use cf_core::HostRecord;

use crate::style::{Deferred, StyleDefinition, ALL_STYLES};
use crate::validation::{Validation, ValidationEngine};

pub const DEFAULT_URL: &str = "/uploads/:id_:style_:basename.:extension";
pub const DEFAULT_PATH: &str = ":root/public/uploads/:id_:style_:basename.:extension";
pub const DEFAULT_MISSING_URL: &str = "/images/backend/no-image.png";
pub const ORIGINAL_STYLE: &str = "original";
pub const DEFAULT_STORAGE: &str = "filesystem";

/// Where style processing runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Styles are processed one after another inside `assign`
    #[default]
    Inline,
    /// Styles are processed concurrently on a spawned task and settled later
    Background,
}

/// Everything declared about one attachment of a host model
pub struct AttachmentDefinition<H> {
    pub name: String,
    pub url: String,
    pub path: String,
    pub default_url: String,
    pub default_style: String,
    pub storage: String,
    pub styles: BTreeMap<String, StyleDefinition<H>>,
    pub processors: Vec<String>,
    /// `None` follows `AttachmentOptions::whiny_thumbnails`
    pub whiny: Option<bool>,
    pub convert_options: BTreeMap<String, Deferred<String, H>>,
    pub validations: ValidationEngine<H>,
    pub processing: ProcessingMode,
}

impl<H: HostRecord> AttachmentDefinition<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: DEFAULT_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            default_url: DEFAULT_MISSING_URL.to_string(),
            default_style: ORIGINAL_STYLE.to_string(),
            storage: DEFAULT_STORAGE.to_string(),
            styles: BTreeMap::new(),
            processors: vec!["thumbnail".to_string()],
            whiny: None,
            convert_options: BTreeMap::new(),
            validations: ValidationEngine::new(),
            processing: ProcessingMode::Inline,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = url.into();
        self
    }

    pub fn with_default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = style.into();
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn with_style(mut self, name: impl Into<String>, style: impl Into<StyleDefinition<H>>) -> Self {
        self.styles.insert(name.into(), style.into());
        self
    }

    pub fn with_processors<I, S>(mut self, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processors = processors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_whiny(mut self, whiny: bool) -> Self {
        self.whiny = Some(whiny);
        self
    }

    /// Extra processor arguments for one style, or for every style under `"all"`
    pub fn with_convert_options(
        mut self,
        style: impl Into<String>,
        options: impl Into<Deferred<String, H>>,
    ) -> Self {
        self.convert_options.insert(style.into(), options.into());
        self
    }

    pub fn with_all_convert_options(self, options: impl Into<Deferred<String, H>>) -> Self {
        self.with_convert_options(ALL_STYLES, options)
    }

    pub fn with_validation(mut self, validation: Validation<H>) -> Self {
        self.validations.add(validation);
        self
    }

    pub fn with_processing(mut self, mode: ProcessingMode) -> Self {
        self.processing = mode;
        self
    }

    /// Style names including the implicit `original`, without duplicates
    pub fn style_names(&self) -> Vec<String> {
        std::iter::once(ORIGINAL_STYLE.to_string())
            .chain(
                self.styles
                    .keys()
                    .filter(|name| name.as_str() != ORIGINAL_STYLE)
                    .cloned(),
            )
            .collect()
    }
}

impl<H> std::fmt::Debug for AttachmentDefinition<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentDefinition")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("storage", &self.storage)
            .field("styles", &self.styles.keys().collect::<Vec<_>>())
            .field("processors", &self.processors)
            .field("processing", &self.processing)
            .finish_non_exhaustive()
    }
}
