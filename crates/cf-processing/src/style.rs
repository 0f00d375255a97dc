//! Literal style definitions consumed by processors

/// A style with every deferred value resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStyle {
    /// Style name, e.g. `thumb`
    pub name: String,
    /// Geometry string, e.g. `100x100!`
    pub geometry: String,
    /// Target format/extension override
    pub format: Option<String>,
    /// Processor names, applied left to right
    pub processors: Vec<String>,
    /// Record processing failures as attachment errors
    pub whiny: bool,
    /// Extra command-line arguments for the processors
    pub convert_options: String,
}

impl ResolvedStyle {
    pub fn new(name: impl Into<String>, geometry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            geometry: geometry.into(),
            format: None,
            processors: vec!["thumbnail".to_string()],
            whiny: false,
            convert_options: String::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
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
        self.whiny = whiny;
        self
    }

    pub fn with_convert_options(mut self, options: impl Into<String>) -> Self {
        self.convert_options = options.into();
        self
    }
}
