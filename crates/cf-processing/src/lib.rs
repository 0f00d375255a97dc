//! # cf-processing
//!
//! Turns an original upload into derived style artifacts.
//!
//! ## Components
//!
//! - [`Artifact`]: a spooled temp file, deleted when dropped
//! - [`CommandRunner`]: runs external programs; [`SystemCommandRunner`] is the
//!   `tokio::process` implementation with search-path prefix and timeout
//! - [`Processor`]: one transformation step; [`Thumbnail`] shells out to
//!   ImageMagick's `convert`/`identify`
//! - [`ProcessorRegistry`]: processors by name
//! - [`Pipeline`]: folds a style's processor chain over the original
//!
//! ## Example
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new(
//!     Arc::new(ProcessorRegistry::default()),
//!     Arc::new(SystemCommandRunner::from_options(&options)),
//! );
//! let plan = pipeline.plan(&style)?;
//! let thumb = pipeline.run(&original, &plan).await?;
//! ```

pub mod artifact;
pub mod command;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod processor;
pub mod style;
pub mod thumbnail;

pub use artifact::Artifact;
pub use command::{CommandRunner, SystemCommandRunner};
pub use error::{CommandLineError, ProcessingError, ProcessingResult};
pub use geometry::{Geometry, Modifier};
pub use pipeline::{Pipeline, Plan};
pub use processor::{Processor, ProcessorRegistry};
pub use style::ResolvedStyle;
pub use thumbnail::Thumbnail;
