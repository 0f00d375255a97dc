//! Path and URL templating
//!
//! Templates contain `:token` placeholders, e.g.
//! `:root/public/uploads/:id_:style_:basename.:extension`. Tokens are applied
//! longest name first, so `:id` never eats the start of `:id_partition`.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use cf_core::{Environment, HostRecord, Id};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Cannot interpolate :{token} without {attribute}")]
    MissingAttribute { token: String, attribute: String },

    #[error("Interpolation of :{token} failed: {message}")]
    Resolver { token: String, message: String },
}

impl InterpolationError {
    pub fn missing(token: &str, attribute: &str) -> Self {
        Self::MissingAttribute {
            token: token.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn resolver(token: &str, message: impl Into<String>) -> Self {
        Self::Resolver {
            token: token.to_string(),
            message: message.into(),
        }
    }
}

pub type InterpolationResult<T> = Result<T, InterpolationError>;

/// Everything a resolver may read while rendering one template
pub struct InterpolationContext<'a, H> {
    /// Attachment name, e.g. `avatar`
    pub attachment: &'a str,
    pub host: &'a H,
    /// Requested style
    pub style: &'a str,
    pub default_style: &'a str,
    /// Format override of the requested style
    pub format: Option<&'a str>,
    pub environment: &'a Environment,
}

impl<'a, H: HostRecord> InterpolationContext<'a, H> {
    pub fn is_default_style(&self) -> bool {
        self.style == self.default_style
    }

    /// Stored file name of the attachment
    pub fn file_name(&self) -> Option<&'a str> {
        self.host
            .columns(self.attachment)
            .and_then(|columns| columns.file_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    fn require_file_name(&self, token: &str) -> InterpolationResult<&'a str> {
        self.file_name()
            .ok_or_else(|| InterpolationError::missing(token, "file_name"))
    }

    fn require_id(&self, token: &str) -> InterpolationResult<Id> {
        self.host
            .id()
            .ok_or_else(|| InterpolationError::missing(token, "id"))
    }
}

pub type Resolver<H> =
    Arc<dyn Fn(&InterpolationContext<'_, H>) -> InterpolationResult<String> + Send + Sync>;

/// Token name to resolver table
pub struct Interpolator<H> {
    resolvers: BTreeMap<String, Resolver<H>>,
}

impl<H: HostRecord> Default for Interpolator<H> {
    fn default() -> Self {
        let mut interpolator = Self::empty();
        interpolator.register("class", class::<H>);
        interpolator.register("id", id::<H>);
        interpolator.register("id_partition", id_partition::<H>);
        interpolator.register("basename", basename::<H>);
        interpolator.register("extension", extension::<H>);
        interpolator.register("attachment", attachment::<H>);
        interpolator.register("style", style::<H>);
        interpolator.register("root", root::<H>);
        interpolator.register("env", env::<H>);
        interpolator
    }
}

impl<H: HostRecord> Interpolator<H> {
    /// Interpolator with the built-in tokens
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            resolvers: BTreeMap::new(),
        }
    }

    /// Add or replace a token
    pub fn register<F>(&mut self, token: impl Into<String>, resolver: F)
    where
        F: Fn(&InterpolationContext<'_, H>) -> InterpolationResult<String> + Send + Sync + 'static,
    {
        self.resolvers.insert(token.into(), Arc::new(resolver));
    }

    pub fn with<F>(mut self, token: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&InterpolationContext<'_, H>) -> InterpolationResult<String> + Send + Sync + 'static,
    {
        self.register(token, resolver);
        self
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.ordered().into_iter().map(|(token, _)| token).collect()
    }

    fn ordered(&self) -> Vec<(&str, &Resolver<H>)> {
        let mut ordered: Vec<(&str, &Resolver<H>)> = self
            .resolvers
            .iter()
            .map(|(token, resolver)| (token.as_str(), resolver))
            .collect();
        // BTreeMap order already breaks ties alphabetically
        ordered.sort_by_key(|(token, _)| Reverse(token.len()));
        ordered
    }

    /// Render `template` for the context's style
    pub fn render(
        &self,
        template: &str,
        ctx: &InterpolationContext<'_, H>,
    ) -> InterpolationResult<String> {
        let mut result = template.to_string();

        if ctx.is_default_style() {
            result = result.replace(":style_", "");
        }

        for (token, resolver) in self.ordered() {
            let tag = format!(":{token}");
            if !result.contains(&tag) {
                continue;
            }
            let value = resolver(ctx)?;
            result = result.replace(&tag, &value);
        }

        Ok(result)
    }
}

impl<H> std::fmt::Debug for Interpolator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpolator")
            .field("tokens", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn class<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    Ok(pluralize(&underscore(ctx.host.model_name())))
}

fn id<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    Ok(ctx.require_id("id")?.to_string())
}

fn id_partition<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    let padded = format!("{:09}", ctx.require_id("id_partition")?);
    let digits: Vec<u8> = padded.bytes().filter(u8::is_ascii_digit).collect();
    // Leftover digits past the last full group are dropped
    let groups: Vec<String> = digits
        .chunks_exact(3)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    Ok(groups.join("/"))
}

fn basename<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    let file_name = ctx.require_file_name("basename")?;
    Ok(split_extension(file_name).0.to_string())
}

fn extension<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    if let Some(format) = ctx.format {
        return Ok(format.to_string());
    }
    let file_name = ctx.require_file_name("extension")?;
    Ok(split_extension(file_name)
        .1
        .unwrap_or_default()
        .trim_start_matches('.')
        .to_string())
}

fn attachment<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    Ok(pluralize(&ctx.attachment.to_lowercase()))
}

fn style<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    if ctx.is_default_style() {
        Ok(String::new())
    } else {
        Ok(ctx.style.to_string())
    }
}

fn root<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    Ok(ctx.environment.root.display().to_string())
}

fn env<H: HostRecord>(ctx: &InterpolationContext<'_, H>) -> InterpolationResult<String> {
    Ok(ctx.environment.name.clone())
}

/// Split `photo.tar.gz` into `("photo.tar", Some("gz"))`. Leading dots do not
/// start an extension, so `.profile` has none.
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[stem_start..].rfind('.') {
        Some(index) => {
            let index = stem_start + index;
            (&file_name[..index], Some(&file_name[index + 1..]))
        }
        None => (file_name, None),
    }
}

/// `BlogPost` -> `blog_post`, `Admin::User` -> `admin/user`
pub fn underscore(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;

    for c in name.replace("::", "/").chars() {
        if c.is_uppercase() {
            if previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(if c == '-' { '_' } else { c });
        }
        previous = Some(c);
    }

    result
}

/// English plural for the common cases
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{word}es");
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }

    format!("{word}s")
}
