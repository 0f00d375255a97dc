//! Style definitions and normalization
//!
//! Raw definitions come in two shapes: a bare geometry (optionally with a
//! format) or a partial spec. [`normalize`] fills both out with the
//! attachment-wide defaults; [`StyleSpec::solidify`] resolves computed
//! geometries against the host once per assignment.

use std::collections::BTreeMap;
use std::sync::Arc;

use cf_processing::ResolvedStyle;

/// Key of the convert options applied to every style
pub const ALL_STYLES: &str = "all";

/// A value given literally or computed from the host when it is needed
pub enum Deferred<T, H> {
    Literal(T),
    Computed(Arc<dyn Fn(&H) -> T + Send + Sync>),
}

impl<T: Clone, H> Deferred<T, H> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&H) -> T + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, host: &H) -> T {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(host),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

impl<T: Clone, H> Clone for Deferred<T, H> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<T: std::fmt::Debug, H> std::fmt::Debug for Deferred<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<H> From<&str> for Deferred<String, H> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl<H> From<String> for Deferred<String, H> {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Explicit fields of a style; anything left `None` comes from the defaults
pub struct PartialStyle<H> {
    pub geometry: Deferred<String, H>,
    pub format: Option<String>,
    pub processors: Option<Vec<String>>,
    pub whiny: Option<bool>,
    pub convert_options: Option<String>,
}

impl<H> PartialStyle<H> {
    pub fn new(geometry: impl Into<Deferred<String, H>>) -> Self {
        Self {
            geometry: geometry.into(),
            format: None,
            processors: None,
            whiny: None,
            convert_options: None,
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
        self.processors = Some(processors.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_whiny(mut self, whiny: bool) -> Self {
        self.whiny = Some(whiny);
        self
    }

    pub fn with_convert_options(mut self, options: impl Into<String>) -> Self {
        self.convert_options = Some(options.into());
        self
    }
}

impl<H> Clone for PartialStyle<H> {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry.clone(),
            format: self.format.clone(),
            processors: self.processors.clone(),
            whiny: self.whiny,
            convert_options: self.convert_options.clone(),
        }
    }
}

/// A style as declared on an attachment definition
pub enum StyleDefinition<H> {
    /// `"100x100!"` or `("100x100", "png")`
    Geometry {
        geometry: Deferred<String, H>,
        format: Option<String>,
    },
    Spec(PartialStyle<H>),
}

impl<H> StyleDefinition<H> {
    pub fn geometry(geometry: impl Into<String>) -> Self {
        Self::Geometry {
            geometry: Deferred::Literal(geometry.into()),
            format: None,
        }
    }

    pub fn geometry_with_format(geometry: impl Into<String>, format: impl Into<String>) -> Self {
        let format = format.into();
        Self::Geometry {
            geometry: Deferred::Literal(geometry.into()),
            format: (!format.trim().is_empty()).then_some(format),
        }
    }

    /// Geometry computed from the host at assignment time
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&H) -> String + Send + Sync + 'static,
    {
        Self::Geometry {
            geometry: Deferred::computed(f),
            format: None,
        }
    }

    pub fn spec(partial: PartialStyle<H>) -> Self {
        Self::Spec(partial)
    }
}

impl<H> Clone for StyleDefinition<H> {
    fn clone(&self) -> Self {
        match self {
            Self::Geometry { geometry, format } => Self::Geometry {
                geometry: geometry.clone(),
                format: format.clone(),
            },
            Self::Spec(partial) => Self::Spec(partial.clone()),
        }
    }
}

impl<H> From<&str> for StyleDefinition<H> {
    fn from(geometry: &str) -> Self {
        Self::geometry(geometry)
    }
}

impl<H> From<PartialStyle<H>> for StyleDefinition<H> {
    fn from(partial: PartialStyle<H>) -> Self {
        Self::Spec(partial)
    }
}

/// A normalized style. Only the geometry may still be late-bound.
pub struct StyleSpec<H> {
    pub name: String,
    pub geometry: Deferred<String, H>,
    pub format: Option<String>,
    pub processors: Vec<String>,
    pub whiny: bool,
    pub convert_options: String,
}

impl<H> StyleSpec<H> {
    /// Resolve the geometry against the host
    pub fn solidify(&self, host: &H) -> ResolvedStyle {
        ResolvedStyle {
            name: self.name.clone(),
            geometry: self.geometry.resolve(host),
            format: self.format.clone(),
            processors: self.processors.clone(),
            whiny: self.whiny,
            convert_options: self.convert_options.clone(),
        }
    }
}

impl<H> Clone for StyleSpec<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            format: self.format.clone(),
            processors: self.processors.clone(),
            whiny: self.whiny,
            convert_options: self.convert_options.clone(),
        }
    }
}

impl<H> std::fmt::Debug for StyleSpec<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleSpec")
            .field("name", &self.name)
            .field("geometry", &self.geometry)
            .field("format", &self.format)
            .field("processors", &self.processors)
            .field("whiny", &self.whiny)
            .field("convert_options", &self.convert_options)
            .finish()
    }
}

/// Per-style options first, then the `all` options, blanks dropped
pub fn extra_options_for<H>(
    style: &str,
    convert_options: &BTreeMap<String, Deferred<String, H>>,
    host: &H,
) -> String {
    let resolve = |key: &str| {
        convert_options
            .get(key)
            .map(|options| options.resolve(host))
            .filter(|options| !options.trim().is_empty())
    };

    [resolve(style), resolve(ALL_STYLES)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand raw definitions into full specs
pub fn normalize<H>(
    raw_styles: &BTreeMap<String, StyleDefinition<H>>,
    processors_default: &[String],
    whiny_default: bool,
    convert_options: &BTreeMap<String, Deferred<String, H>>,
    host: &H,
) -> BTreeMap<String, StyleSpec<H>> {
    raw_styles
        .iter()
        .map(|(name, definition)| {
            let extra = extra_options_for(name, convert_options, host);
            let spec = match definition {
                StyleDefinition::Geometry { geometry, format } => StyleSpec {
                    name: name.clone(),
                    geometry: geometry.clone(),
                    format: format.clone(),
                    processors: processors_default.to_vec(),
                    whiny: whiny_default,
                    convert_options: extra,
                },
                StyleDefinition::Spec(partial) => StyleSpec {
                    name: name.clone(),
                    geometry: partial.geometry.clone(),
                    format: partial.format.clone(),
                    processors: partial
                        .processors
                        .clone()
                        .unwrap_or_else(|| processors_default.to_vec()),
                    whiny: partial.whiny.unwrap_or(whiny_default),
                    convert_options: partial.convert_options.clone().unwrap_or(extra),
                },
            };
            (name.clone(), spec)
        })
        .collect()
}
