//! ImageMagick-style geometry strings
//!
//! Grammar: `[width][x[height]][modifier]`, e.g. `100x100!`, `640x`, `x50`,
//! `50%`, `120x120#`. `#` is not an ImageMagick modifier: it means resize to
//! fill, then crop.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProcessingError;

static GEOMETRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d*)(?:x(\d*))?([!%<>^#@])?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `!` ignore aspect ratio
    Exact,
    /// `%` scale by percentage
    Percent,
    /// `<` only enlarge smaller images
    EnlargeOnly,
    /// `>` only shrink larger images
    ShrinkOnly,
    /// `^` fill the given area
    Minimum,
    /// `@` limit total pixel area
    Area,
    /// `#` resize to fill, then center crop
    Crop,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '!' => Some(Self::Exact),
            '%' => Some(Self::Percent),
            '<' => Some(Self::EnlargeOnly),
            '>' => Some(Self::ShrinkOnly),
            '^' => Some(Self::Minimum),
            '@' => Some(Self::Area),
            '#' => Some(Self::Crop),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Exact => '!',
            Self::Percent => '%',
            Self::EnlargeOnly => '<',
            Self::ShrinkOnly => '>',
            Self::Minimum => '^',
            Self::Area => '@',
            Self::Crop => '#',
        }
    }
}

/// Width/height pair with an optional modifier. A zero dimension is unspecified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
    pub modifier: Option<Modifier>,
}

impl Geometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            modifier: None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, ProcessingError> {
        value.parse()
    }

    /// Parse the `%wx%h` output of `identify`
    pub fn from_identify(output: &str) -> Option<Self> {
        let geometry = Self::parse(output.trim()).ok()?;
        (geometry.width > 0.0 && geometry.height > 0.0 && geometry.modifier.is_none())
            .then_some(geometry)
    }

    pub fn is_crop(&self) -> bool {
        self.modifier == Some(Modifier::Crop)
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    pub fn is_horizontal(&self) -> bool {
        self.height < self.width
    }

    /// Resize and crop arguments that turn an image of this size into `target`.
    ///
    /// Without `crop` the target is used as the resize geometry. With `crop`
    /// the image is scaled so it covers the target, then cropped around the
    /// center of the overflowing axis.
    pub fn transformation_to(&self, target: &Geometry, crop: bool) -> (String, Option<String>) {
        if !crop || self.width <= 0.0 || self.height <= 0.0 {
            let mut resize = *target;
            if resize.is_crop() {
                resize.modifier = None;
            }
            return (resize.to_string(), None);
        }

        let ratio = Geometry::new(target.width / self.width, target.height / self.height);

        if ratio.is_horizontal() || ratio.is_square() {
            let scale = ratio.width;
            let offset = ((self.height * scale - target.height) / 2.0) as i64;
            (
                format!("{}x", target.width as i64),
                Some(format!(
                    "{}x{}+0+{}",
                    target.width as i64, target.height as i64, offset
                )),
            )
        } else {
            let scale = ratio.height;
            let offset = ((self.width * scale - target.width) / 2.0) as i64;
            (
                format!("x{}", target.height as i64),
                Some(format!(
                    "{}x{}+{}+0",
                    target.width as i64, target.height as i64, offset
                )),
            )
        }
    }
}

impl FromStr for Geometry {
    type Err = ProcessingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ProcessingError::InvalidGeometry(value.to_string());

        let caps = GEOMETRY_PATTERN.captures(value.trim()).ok_or_else(invalid)?;
        let dimension = |index: usize| -> Result<f64, ProcessingError> {
            match caps.get(index).map(|m| m.as_str()) {
                None | Some("") => Ok(0.0),
                Some(digits) => digits.parse::<f64>().map_err(|_| invalid()),
            }
        };

        let width = dimension(1)?;
        let height = dimension(2)?;
        let modifier = caps
            .get(3)
            .and_then(|m| m.as_str().chars().next())
            .and_then(Modifier::from_char);

        if width == 0.0 && height == 0.0 {
            return Err(invalid());
        }
        if modifier == Some(Modifier::Crop) && (width == 0.0 || height == 0.0) {
            return Err(invalid());
        }

        Ok(Self {
            width,
            height,
            modifier,
        })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width > 0.0 {
            write!(f, "{}", self.width as i64)?;
        }
        if self.height > 0.0 {
            write!(f, "x{}", self.height as i64)?;
        }
        if let Some(modifier) = self.modifier {
            write!(f, "{}", modifier.as_char())?;
        }
        Ok(())
    }
}
