//! Style pipelines
//!
//! A [`Plan`] is a style with its processor chain resolved up front, so an
//! unknown processor name is reported before any file is touched.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};

use crate::artifact::Artifact;
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::error::{ProcessingError, ProcessingResult};
use crate::processor::{Processor, ProcessorRegistry};
use crate::style::ResolvedStyle;

/// A style bound to the processors that will produce it
#[derive(Clone)]
pub struct Plan {
    pub style: ResolvedStyle,
    stages: Vec<(String, Arc<dyn Processor>)>,
}

impl Plan {
    pub fn name(&self) -> &str {
        &self.style.name
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Plan")
            .field("style", &self.style)
            .field("stages", &stages)
            .finish()
    }
}

/// Runs processor chains against an original artifact
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<ProcessorRegistry>,
    runner: Arc<dyn CommandRunner>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(
            Arc::new(ProcessorRegistry::default()),
            Arc::new(SystemCommandRunner::default()),
        )
    }
}

impl Pipeline {
    pub fn new(registry: Arc<ProcessorRegistry>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Resolve every processor named by `style`
    pub fn plan(&self, style: &ResolvedStyle) -> ProcessingResult<Plan> {
        let stages = style
            .processors
            .iter()
            .map(|name| Ok((name.clone(), self.registry.resolve(name)?)))
            .collect::<ProcessingResult<Vec<_>>>()?;

        Ok(Plan {
            style: style.clone(),
            stages,
        })
    }

    /// Fold the original through each stage, left to right.
    ///
    /// Intermediate artifacts are dropped as soon as the next stage has
    /// consumed them. The original is never modified.
    #[instrument(skip(self, original, plan), fields(style = %plan.style.name))]
    pub async fn run(&self, original: &Artifact, plan: &Plan) -> ProcessingResult<Artifact> {
        if plan.stages.is_empty() {
            return Err(ProcessingError::NoProcessorsDefined(plan.style.name.clone()));
        }

        let mut current: Option<Artifact> = None;
        for (name, processor) in &plan.stages {
            let source = current.as_ref().unwrap_or(original);
            debug!(processor = %name, source = %source.path().display(), "Running processor");

            let output = processor
                .make(source, &plan.style, self.runner.as_ref())
                .await?;
            current = Some(output);
        }

        current.ok_or_else(|| ProcessingError::NoProcessorsDefined(plan.style.name.clone()))
    }

    /// Plan and run a single style
    pub async fn run_style(
        &self,
        original: &Artifact,
        style: &ResolvedStyle,
    ) -> ProcessingResult<Artifact> {
        let plan = self.plan(style)?;
        self.run(original, &plan).await
    }

    /// Run several plans concurrently against the same original.
    ///
    /// Results come back in plan order, one per plan.
    pub async fn run_all(
        &self,
        original: &Artifact,
        plans: &[Plan],
    ) -> Vec<(String, ProcessingResult<Artifact>)> {
        let runs = plans.iter().map(|plan| async move {
            (plan.style.name.clone(), self.run(original, plan).await)
        });
        join_all(runs).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandLineError;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct NoCommands;

    #[async_trait]
    impl CommandRunner for NoCommands {
        async fn run(
            &self,
            command: &str,
            _args: &[String],
            _expected_exit_codes: &[i32],
        ) -> Result<String, CommandLineError> {
            Err(CommandLineError::UnexpectedExit {
                command: command.to_string(),
                code: None,
                stderr: "commands are not available in tests".to_string(),
            })
        }
    }

    /// Appends a marker to the source contents
    struct Append(&'static str);

    #[async_trait]
    impl Processor for Append {
        async fn make(
            &self,
            source: &Artifact,
            _style: &ResolvedStyle,
            _runner: &dyn CommandRunner,
        ) -> ProcessingResult<Artifact> {
            let mut data = source.read().await?.to_vec();
            data.extend_from_slice(self.0.as_bytes());
            Ok(Artifact::from_bytes(&data, source.extension()).await?)
        }
    }

    struct Fail;

    #[async_trait]
    impl Processor for Fail {
        async fn make(
            &self,
            source: &Artifact,
            _style: &ResolvedStyle,
            runner: &dyn CommandRunner,
        ) -> ProcessingResult<Artifact> {
            runner
                .run("convert", &[], &[0])
                .await
                .map_err(|e| ProcessingError::command_line("fail", source.basename(), e))?;
            unreachable!("test runner never succeeds")
        }
    }

    fn pipeline() -> Pipeline {
        let registry = ProcessorRegistry::empty()
            .with("upper", Append("+a"))
            .with("lower", Append("+b"))
            .with("fail", Fail);
        Pipeline::new(Arc::new(registry), Arc::new(NoCommands))
    }

    fn style(name: &str, processors: &[&str]) -> ResolvedStyle {
        ResolvedStyle::new(name, "10x10")
            .with_processors(processors.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let original = Artifact::from_bytes(b"src", Some("txt")).await.unwrap();
        let result = pipeline()
            .run_style(&original, &style("thumb", &["upper", "lower"]))
            .await
            .unwrap();

        assert_eq!(result.read().await.unwrap(), Bytes::from("src+a+b"));
        assert_eq!(original.read().await.unwrap(), Bytes::from("src"));
    }

    #[test]
    fn test_unknown_processor_fails_planning() {
        let result = pipeline().plan(&style("thumb", &["upper", "watermark"]));
        assert!(matches!(
            result,
            Err(ProcessingError::ProcessorNotFound(name)) if name == "watermark"
        ));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let pipeline = pipeline();
        let plan = pipeline.plan(&style("bare", &[])).unwrap();
        assert!(plan.is_empty());

        let original = Artifact::from_bytes(b"src", None).await.unwrap();
        let result = pipeline.run(&original, &plan).await;
        assert!(matches!(
            result,
            Err(ProcessingError::NoProcessorsDefined(name)) if name == "bare"
        ));
    }

    #[tokio::test]
    async fn test_failing_stage_stops_chain() {
        let original = Artifact::from_bytes(b"src", None).await.unwrap();
        let result = pipeline()
            .run_style(&original, &style("thumb", &["upper", "fail", "lower"]))
            .await;
        assert!(matches!(result, Err(ProcessingError::CommandLine { .. })));
    }

    #[tokio::test]
    async fn test_run_all_keeps_plan_order() {
        let pipeline = pipeline();
        let plans = vec![
            pipeline.plan(&style("a", &["upper"])).unwrap(),
            pipeline.plan(&style("b", &["fail"])).unwrap(),
            pipeline.plan(&style("c", &["lower"])).unwrap(),
        ];

        let original = Artifact::from_bytes(b"x", None).await.unwrap();
        let results = pipeline.run_all(&original, &plans).await;

        let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(
            results[2].1.as_ref().unwrap().read().await.unwrap(),
            Bytes::from("x+b")
        );
    }
}
