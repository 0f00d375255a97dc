//! Layered settings: `CLIPFILE_*` defaults, then the settings file, then `CLIPFILE__*` overrides

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use cf_attachments::{
    AttachmentDefinition, ContentTypeRule, PartialStyle, ProcessingMode, StyleDefinition, Validation,
};
use cf_core::{AttachmentOptions, Environment, HostRecord};
use config::builder::DefaultState;
use config::ConfigBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Settings file looked up in the working directory when `--config` is not given
pub const DEFAULT_SETTINGS_FILE: &str = "clipfile";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub options: AttachmentOptions,
    pub environment: Environment,
    pub attachments: BTreeMap<String, AttachmentSettings>,
}

/// One attachment as declared in the settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentSettings {
    pub url: Option<String>,
    pub path: Option<String>,
    pub default_url: Option<String>,
    pub default_style: Option<String>,
    pub storage: Option<String>,
    pub styles: BTreeMap<String, StyleSettings>,
    pub processors: Option<Vec<String>>,
    pub whiny: Option<bool>,
    pub convert_options: BTreeMap<String, String>,
    pub required: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Exact content types, or `/regex/` patterns
    pub content_types: Vec<String>,
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleSettings {
    /// `thumb = "100x100#"`
    Geometry(String),
    /// `thumb = { geometry = "100x100#", format = "png" }`
    Full {
        geometry: String,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        processors: Option<Vec<String>>,
        #[serde(default)]
        whiny: Option<bool>,
        #[serde(default)]
        convert_options: Option<String>,
    },
}

impl Settings {
    /// Load settings, reading `path` if given or an optional `clipfile.*` file otherwise
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };
        let builder = Self::defaults()?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("CLIPFILE")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    /// Builder seeded with options and environment read from `CLIPFILE_*` variables
    pub fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
        let defaults = Settings {
            options: AttachmentOptions::from_env()?,
            environment: Environment::from_env(),
            attachments: BTreeMap::new(),
        };
        Ok(config::Config::builder().add_source(config::Config::try_from(&defaults)?))
    }

    pub fn build(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        builder
            .build()?
            .try_deserialize()
            .context("invalid clipfile settings")
    }

    pub fn definition<H: HostRecord>(&self, name: &str) -> anyhow::Result<AttachmentDefinition<H>> {
        self.attachments
            .get(name)
            .with_context(|| format!("attachment '{name}' is not configured"))?
            .to_definition(name)
    }
}

impl AttachmentSettings {
    pub fn to_definition<H: HostRecord>(&self, name: &str) -> anyhow::Result<AttachmentDefinition<H>> {
        let mut definition = AttachmentDefinition::new(name);

        if let Some(url) = &self.url {
            definition = definition.with_url(url);
        }
        if let Some(path) = &self.path {
            definition = definition.with_path(path);
        }
        if let Some(default_url) = &self.default_url {
            definition = definition.with_default_url(default_url);
        }
        if let Some(style) = &self.default_style {
            definition = definition.with_default_style(style);
        }
        if let Some(storage) = &self.storage {
            definition = definition.with_storage(storage);
        }
        if let Some(processors) = &self.processors {
            definition = definition.with_processors(processors.iter().cloned());
        }
        if let Some(whiny) = self.whiny {
            definition = definition.with_whiny(whiny);
        }
        if self.background {
            definition = definition.with_processing(ProcessingMode::Background);
        }

        for (style, settings) in &self.styles {
            definition = definition.with_style(style.clone(), settings.to_definition());
        }
        for (style, options) in &self.convert_options {
            definition = definition.with_convert_options(style.clone(), options.clone());
        }

        if self.required {
            definition = definition.with_validation(Validation::presence());
        }
        match (self.min_size, self.max_size) {
            (Some(min), Some(max)) => definition = definition.with_validation(Validation::size(min, max)),
            (Some(min), None) => definition = definition.with_validation(Validation::min_size(min)),
            (None, Some(max)) => definition = definition.with_validation(Validation::max_size(max)),
            (None, None) => {}
        }
        if !self.content_types.is_empty() {
            let rules = self
                .content_types
                .iter()
                .map(|rule| content_type_rule(rule))
                .collect::<anyhow::Result<Vec<_>>>()?;
            definition = definition.with_validation(Validation::content_type(rules));
        }

        Ok(definition)
    }
}

impl StyleSettings {
    pub fn to_definition<H>(&self) -> StyleDefinition<H> {
        match self {
            Self::Geometry(geometry) => StyleDefinition::geometry(geometry.clone()),
            Self::Full {
                geometry,
                format,
                processors,
                whiny,
                convert_options,
            } => {
                let mut partial = PartialStyle::new(geometry.clone());
                partial.format = format.clone().filter(|f| !f.trim().is_empty());
                partial.processors = processors.clone();
                partial.whiny = *whiny;
                partial.convert_options = convert_options.clone();
                StyleDefinition::spec(partial)
            }
        }
    }
}

fn content_type_rule(rule: &str) -> anyhow::Result<ContentTypeRule> {
    match rule.strip_prefix('/').and_then(|r| r.strip_suffix('/')) {
        Some(pattern) if !pattern.is_empty() => {
            let regex = Regex::new(pattern)
                .with_context(|| format!("invalid content type pattern {rule}"))?;
            Ok(ContentTypeRule::from(regex))
        }
        _ => Ok(ContentTypeRule::from(rule)),
    }
}
