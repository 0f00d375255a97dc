//! ImageMagick thumbnail processor

use async_trait::async_trait;
use tracing::debug;

use crate::artifact::Artifact;
use crate::command::CommandRunner;
use crate::error::{ProcessingError, ProcessingResult};
use crate::geometry::Geometry;
use crate::processor::Processor;
use crate::style::ResolvedStyle;

/// Resizes (and optionally crops) the first frame of an image with `convert`.
///
/// The output format is the style's `format` if set, otherwise the source's
/// extension. Crop geometries (`#`) identify the source size first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Thumbnail;

impl Thumbnail {
    async fn identify(
        &self,
        source: &Artifact,
        runner: &dyn CommandRunner,
    ) -> ProcessingResult<Geometry> {
        let args = vec![
            "-format".to_string(),
            "%wx%h".to_string(),
            first_frame(source),
        ];

        let output = runner
            .run("identify", &args, &[0])
            .await
            .map_err(|_| ProcessingError::NotIdentified(source.basename()))?;

        Geometry::from_identify(&output).ok_or_else(|| ProcessingError::NotIdentified(source.basename()))
    }
}

fn first_frame(source: &Artifact) -> String {
    format!("{}[0]", source.path().display())
}

#[async_trait]
impl Processor for Thumbnail {
    async fn make(
        &self,
        source: &Artifact,
        style: &ResolvedStyle,
        runner: &dyn CommandRunner,
    ) -> ProcessingResult<Artifact> {
        let target = Geometry::parse(&style.geometry)?;
        let format = style
            .format
            .clone()
            .or_else(|| source.extension().map(str::to_string));
        let destination = Artifact::reserve(format.as_deref())?;

        let mut args = vec![first_frame(source)];

        if target.is_crop() {
            let current = self.identify(source, runner).await?;
            let (scale, crop) = current.transformation_to(&target, true);
            args.push("-resize".to_string());
            args.push(scale);
            if let Some(crop) = crop {
                args.push("-crop".to_string());
                args.push(crop);
                args.push("+repage".to_string());
            }
        } else {
            args.push("-resize".to_string());
            args.push(target.to_string());
        }

        args.extend(style.convert_options.split_whitespace().map(str::to_string));

        let output_path = destination.path().display().to_string();
        args.push(match &format {
            Some(format) => format!("{format}:{output_path}"),
            None => output_path,
        });

        debug!(style = %style.name, args = ?args, "Creating thumbnail");

        runner
            .run("convert", &args, &[0])
            .await
            .map_err(|e| ProcessingError::command_line("thumbnail", source.basename(), e))?;

        Ok(destination.refresh().await?)
    }
}
