//! The attachment manager
//!
//! An [`Attachment`] binds one named attachment of a host record to storage.
//! Assigning a file spools it, records its metadata on the host and derives
//! the declared styles; nothing reaches storage until [`Attachment::save`].
//! The host is lent to every call and never stored.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use cf_core::{AttachmentColumns, AttachmentOptions, Environment, HostRecord, ValidationErrors};
use cf_processing::{
    Artifact, CommandRunner, Pipeline, Plan, ProcessingError, ProcessingResult, Processor,
    ProcessorRegistry, ResolvedStyle, SystemCommandRunner,
};
use cf_storage::{LocalStorage, Storage, StorageError, StorageRegistry};
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::definition::{AttachmentDefinition, ProcessingMode, DEFAULT_STORAGE, ORIGINAL_STYLE};
use crate::error::{AttachmentError, AttachmentResult};
use crate::interpolation::{InterpolationContext, Interpolator};
use crate::style::{normalize, StyleSpec};
use crate::upload::{Upload, UploadedFile};

/// Error key for processing failures
pub const PROCESSING_ERRORS: &str = "processing";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]+").unwrap());

/// Trim a file name and replace each run of unsafe characters with `_`
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_FILENAME_CHARS
        .replace_all(name.trim(), "_")
        .into_owned()
}

/// Result of [`Attachment::assign`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// A new file is queued
    Assigned,
    /// The current file is queued for deletion
    Cleared,
    /// The upload lacked a usable file name or a content type; nothing changed
    Rejected,
}

/// Shared collaborators of every attachment
pub struct AttachmentContext<H> {
    pub storage: StorageRegistry,
    pub processors: Arc<ProcessorRegistry>,
    pub runner: Arc<dyn CommandRunner>,
    pub interpolator: Arc<Interpolator<H>>,
    pub options: AttachmentOptions,
    pub environment: Environment,
}

impl<H: HostRecord> Default for AttachmentContext<H> {
    fn default() -> Self {
        Self::new(AttachmentOptions::default(), Environment::default())
    }
}

impl<H: HostRecord> AttachmentContext<H> {
    /// Filesystem storage under the environment root, built-in processors and tokens
    pub fn new(options: AttachmentOptions, environment: Environment) -> Self {
        let storage = StorageRegistry::new().with(DEFAULT_STORAGE, LocalStorage::new(&environment.root));
        let runner = SystemCommandRunner::from_options(&options);

        Self {
            storage,
            processors: Arc::new(ProcessorRegistry::default()),
            runner: Arc::new(runner),
            interpolator: Arc::new(Interpolator::default()),
            options,
            environment,
        }
    }

    pub fn with_storage<S: Storage + 'static>(mut self, name: impl Into<String>, storage: S) -> Self {
        self.storage.register(name, storage);
        self
    }

    pub fn with_shared_storage(mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.storage.register_shared(name, storage);
        self
    }

    pub fn with_processor<P: Processor + 'static>(mut self, name: impl Into<String>, processor: P) -> Self {
        Arc::make_mut(&mut self.processors).register(name, processor);
        self
    }

    pub fn with_runner<R: CommandRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn with_interpolator(mut self, interpolator: Interpolator<H>) -> Self {
        self.interpolator = Arc::new(interpolator);
        self
    }
}

impl<H> Clone for AttachmentContext<H> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            processors: Arc::clone(&self.processors),
            runner: Arc::clone(&self.runner),
            interpolator: Arc::clone(&self.interpolator),
            options: self.options.clone(),
            environment: self.environment.clone(),
        }
    }
}

type StyleResults = Vec<(String, ProcessingResult<Artifact>)>;

/// Spawned style processing. Dropping it cancels the task.
struct BackgroundTask(JoinHandle<StyleResults>);

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One named attachment of one host record
pub struct Attachment<H> {
    definition: Arc<AttachmentDefinition<H>>,
    context: AttachmentContext<H>,
    storage: Arc<dyn Storage>,
    pipeline: Pipeline,
    styles: BTreeMap<String, StyleSpec<H>>,
    resolved: BTreeMap<String, ResolvedStyle>,
    queued_for_write: BTreeMap<String, Arc<Artifact>>,
    queued_for_delete: Vec<String>,
    errors: ValidationErrors,
    validation: Option<BTreeMap<String, String>>,
    dirty: bool,
    pending: Option<BackgroundTask>,
}

impl<H: HostRecord> Attachment<H> {
    /// Bind `definition` to a host. Fails when the host has no columns for
    /// the attachment or the storage backend is not registered.
    pub fn new(
        definition: Arc<AttachmentDefinition<H>>,
        context: AttachmentContext<H>,
        host: &H,
    ) -> AttachmentResult<Self> {
        if host.columns(&definition.name).is_none() {
            return Err(AttachmentError::missing_columns(host.model_name(), &definition.name));
        }

        let storage = context
            .storage
            .get(&definition.storage)
            .map_err(|e| AttachmentError::configuration(e.to_string()))?;

        let whiny = definition.whiny.unwrap_or(context.options.whiny_thumbnails);
        let styles = normalize(
            &definition.styles,
            &definition.processors,
            whiny,
            &definition.convert_options,
            host,
        );
        let pipeline = Pipeline::new(Arc::clone(&context.processors), Arc::clone(&context.runner));

        let attachment = Self {
            definition,
            context,
            storage,
            pipeline,
            styles,
            resolved: BTreeMap::new(),
            queued_for_write: BTreeMap::new(),
            queued_for_delete: Vec::new(),
            errors: ValidationErrors::new(),
            validation: None,
            dirty: false,
            pending: None,
        };
        attachment.log(format_args!("Attachment on {} initialized", host.model_name()));

        Ok(attachment)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AttachmentDefinition<H> {
        &self.definition
    }

    pub fn styles(&self) -> &BTreeMap<String, StyleSpec<H>> {
        &self.styles
    }

    pub fn default_style(&self) -> &str {
        &self.definition.default_style
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// True from an assignment until the next successful save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether background processing has not been settled yet
    pub fn is_processing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn queued_for_write(&self) -> &BTreeMap<String, Arc<Artifact>> {
        &self.queued_for_write
    }

    pub fn queued_for_delete(&self) -> &[String] {
        &self.queued_for_delete
    }

    fn columns<'h>(&self, host: &'h H) -> Option<&'h AttachmentColumns> {
        host.columns(&self.definition.name)
    }

    fn columns_mut<'h>(&self, host: &'h mut H) -> AttachmentResult<&'h mut AttachmentColumns> {
        let model = host.model_name().to_string();
        host.columns_mut(&self.definition.name)
            .ok_or_else(|| AttachmentError::missing_columns(&model, &self.definition.name))
    }

    fn require_columns(&self, host: &H) -> AttachmentResult<()> {
        match self.columns(host) {
            Some(_) => Ok(()),
            None => Err(AttachmentError::missing_columns(host.model_name(), &self.definition.name)),
        }
    }

    /// Whether a file is assigned
    pub fn exists(&self, host: &H) -> bool {
        self.columns(host).is_some_and(AttachmentColumns::has_file)
    }

    pub fn original_filename<'h>(&self, host: &'h H) -> Option<&'h str> {
        self.columns(host)?.file_name.as_deref()
    }

    pub fn content_type<'h>(&self, host: &'h H) -> Option<&'h str> {
        self.columns(host)?.content_type.as_deref()
    }

    /// Stored size, or the size of the pending original
    pub fn size(&self, host: &H) -> Option<u64> {
        self.columns(host)
            .and_then(|columns| columns.file_size)
            .or_else(|| self.queued_for_write.get(ORIGINAL_STYLE).map(|original| original.size()))
    }

    pub fn updated_at(&self, host: &H) -> Option<DateTime<Utc>> {
        self.columns(host)?.updated_at
    }

    fn log(&self, message: std::fmt::Arguments<'_>) {
        if self.context.options.log {
            info!(attachment = %self.definition.name, "{}", message);
        }
    }

    fn interpolate(&self, template: &str, host: &H, style: &str) -> AttachmentResult<String> {
        let ctx = InterpolationContext {
            attachment: &self.definition.name,
            host,
            style,
            default_style: &self.definition.default_style,
            format: self.styles.get(style).and_then(|spec| spec.format.as_deref()),
            environment: &self.context.environment,
        };
        Ok(self.context.interpolator.render(template, &ctx)?)
    }

    /// Storage key of a style, `None` when no file is assigned
    pub fn path(&self, host: &H, style: Option<&str>) -> AttachmentResult<Option<String>> {
        if !self.exists(host) {
            return Ok(None);
        }
        let style = style.unwrap_or(self.definition.default_style.as_str());
        self.interpolate(&self.definition.path, host, style).map(Some)
    }

    /// Public URL of a style.
    ///
    /// Falls back to the original's URL when the style was never stored, and
    /// to the default URL when no file is assigned.
    pub async fn url(
        &mut self,
        host: &mut H,
        style: Option<&str>,
        include_timestamp: bool,
    ) -> AttachmentResult<String> {
        self.settle(host).await?;

        let host: &H = host;
        let definition = Arc::clone(&self.definition);
        let style = style.unwrap_or(definition.default_style.as_str());

        let url = if !self.exists(host) {
            self.interpolate(&definition.default_url, host, style)?
        } else {
            let key = self.interpolate(&definition.path, host, style)?;
            if self.storage.exists(&key).await? {
                self.interpolate(&definition.url, host, style)?
            } else {
                self.interpolate(&definition.url, host, ORIGINAL_STYLE)?
            }
        };

        Ok(match self.updated_at(host).filter(|_| include_timestamp) {
            Some(updated_at) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{url}{separator}{}", updated_at.timestamp())
            }
            None => url,
        })
    }

    /// Assign a new file, or clear the current one with [`Upload::Clear`].
    ///
    /// The previous files are queued for deletion, the new one is spooled and
    /// its metadata written to the host. Styles are processed only when the
    /// attachment is valid. Validation always runs before returning.
    pub async fn assign(
        &mut self,
        host: &mut H,
        upload: impl Into<Upload>,
    ) -> AttachmentResult<AssignOutcome> {
        let result = self.assign_upload(host, upload.into()).await;
        self.validate(host);
        result
    }

    async fn assign_upload(&mut self, host: &mut H, upload: Upload) -> AttachmentResult<AssignOutcome> {
        self.require_columns(host)?;

        let file = match upload {
            Upload::Clear => {
                self.abandon_processing();
                self.queue_existing_for_delete(host).await?;
                self.queued_for_write.clear();
                self.reset_validation();
                self.dirty = !self.queued_for_delete.is_empty();
                self.log(format_args!("Cleared {}", self.definition.name));
                return Ok(AssignOutcome::Cleared);
            }
            Upload::File(file) => file,
        };

        let file_name = file
            .original_filename
            .as_deref()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty());
        let (Some(file_name), Some(content_type)) = (file_name, file.content_type.clone()) else {
            debug!(attachment = %self.definition.name, "Upload has no file name or content type, ignoring");
            return Ok(AssignOutcome::Rejected);
        };

        self.log(format_args!("Assigning {} to {}", file_name, self.definition.name));

        self.abandon_processing();
        self.queue_existing_for_delete(host).await?;
        self.reset_validation();

        let size = file.size;
        let original = file.into_artifact().await?;
        self.queued_for_write.clear();
        self.queued_for_write
            .insert(ORIGINAL_STYLE.to_string(), Arc::new(original));

        self.log(format_args!("Writing attributes for {}", self.definition.name));
        let columns = self.columns_mut(host)?;
        columns.file_name = Some(file_name);
        columns.content_type = Some(content_type.trim().to_string());
        columns.file_size = Some(size);
        columns.updated_at = Some(Utc::now());

        self.dirty = true;
        self.solidify(host);

        if self.check_valid(host) {
            self.post_process(host).await?;
        }

        self.sync_file_size(host);
        Ok(AssignOutcome::Assigned)
    }

    async fn queue_existing_for_delete(&mut self, host: &mut H) -> AttachmentResult<()> {
        if !self.exists(host) {
            return Ok(());
        }
        self.log(format_args!(
            "Queueing the existing files for {} for deletion",
            self.definition.name
        ));

        for style in self.definition.style_names() {
            let Some(key) = self.path(host, Some(style.as_str()))? else {
                continue;
            };
            if self.storage.exists(&key).await? && !self.queued_for_delete.contains(&key) {
                self.queued_for_delete.push(key);
            }
        }

        self.columns_mut(host)?.clear();
        Ok(())
    }

    fn reset_validation(&mut self) {
        self.errors.clear();
        self.validation = None;
    }

    fn solidify(&mut self, host: &H) {
        self.resolved = self
            .styles
            .iter()
            .map(|(name, spec)| (name.clone(), spec.solidify(host)))
            .collect();
    }

    /// Run the validations once per assignment cycle and merge failures into
    /// the errors. Later calls return the memoized result.
    pub fn validate(&mut self, host: &H) -> &BTreeMap<String, String> {
        let results = match self.validation.take() {
            Some(results) => results,
            None => {
                let definition = Arc::clone(&self.definition);
                let results = definition.validations.run(self, host);
                for (kind, message) in &results {
                    self.errors.add(kind.clone(), message.clone());
                }
                results
            }
        };
        self.validation.insert(results)
    }

    fn check_valid(&mut self, host: &H) -> bool {
        self.validate(host);
        self.errors.is_empty()
    }

    /// Settle background processing, then validate
    pub async fn is_valid(&mut self, host: &mut H) -> AttachmentResult<bool> {
        self.settle(host).await?;
        Ok(self.check_valid(host))
    }

    async fn post_process(&mut self, host: &mut H) -> AttachmentResult<()> {
        let Some(original) = self.queued_for_write.get(ORIGINAL_STYLE).cloned() else {
            return Ok(());
        };

        if !host.before_post_process(&self.definition.name) {
            self.log(format_args!("Processing of {} was cancelled by the host", self.definition.name));
            return Ok(());
        }

        // Every chain is resolved before any processor runs
        let plans = self
            .resolved
            .values()
            .map(|style| self.pipeline.plan(style))
            .collect::<ProcessingResult<Vec<Plan>>>()?;

        match self.definition.processing {
            ProcessingMode::Inline => {
                self.log(format_args!("Post-processing {}", self.definition.name));
                for plan in &plans {
                    let result = self.pipeline.run(&original, plan).await;
                    self.record(plan.name(), result);
                }
                self.finish_post_process(host);
            }
            ProcessingMode::Background => {
                self.log(format_args!("Post-processing {} in the background", self.definition.name));
                let pipeline = self.pipeline.clone();
                let handle = tokio::spawn(async move { pipeline.run_all(&original, &plans).await });
                self.pending = Some(BackgroundTask(handle));
            }
        }

        Ok(())
    }

    fn record(&mut self, style: &str, result: ProcessingResult<Artifact>) {
        match result {
            Ok(artifact) => {
                debug!(attachment = %self.definition.name, style = %style, size = artifact.size(), "Style processed");
                self.queued_for_write
                    .insert(style.to_string(), Arc::new(artifact));
            }
            Err(err @ ProcessingError::NoProcessorsDefined(_)) => {
                warn!(attachment = %self.definition.name, style = %style, "{}", err);
                self.errors.add(PROCESSING_ERRORS, err.to_string());
            }
            Err(err) => {
                self.log(format_args!("An error was received while processing {style}: {err}"));
                if self.resolved.get(style).is_some_and(|spec| spec.whiny) {
                    self.errors.add(PROCESSING_ERRORS, err.to_string());
                }
            }
        }
    }

    fn finish_post_process(&mut self, host: &mut H) {
        if !host.after_post_process(&self.definition.name) {
            self.log(format_args!(
                "after_post_process for {} halted the callback chain",
                self.definition.name
            ));
        }
        self.sync_file_size(host);
    }

    /// A style named `original` may have replaced the queued original
    fn sync_file_size(&self, host: &mut H) {
        let Some(original) = self.queued_for_write.get(ORIGINAL_STYLE) else {
            return;
        };
        if let Some(columns) = host.columns_mut(&self.definition.name) {
            columns.file_size = Some(original.size());
        }
    }

    /// Wait for background processing and fold its results into the queues.
    /// Does nothing when no processing is pending.
    pub async fn settle(&mut self, host: &mut H) -> AttachmentResult<()> {
        let Some(mut task) = self.pending.take() else {
            return Ok(());
        };

        let results = (&mut task.0)
            .await
            .map_err(|e| AttachmentError::Background(e.to_string()))?;

        for (style, result) in results {
            self.record(&style, result);
        }
        self.finish_post_process(host);

        Ok(())
    }

    fn abandon_processing(&mut self) {
        if self.pending.take().is_some() {
            debug!(attachment = %self.definition.name, "Abandoned pending background processing");
        }
    }

    /// Commit the queues to storage.
    ///
    /// When the attachment is invalid every error message is pushed onto the
    /// host under the attachment name and `false` is returned without any
    /// storage I/O. Otherwise queued deletes run first, then queued writes.
    pub async fn save(&mut self, host: &mut H) -> AttachmentResult<bool> {
        self.settle(host).await?;

        if !self.check_valid(host) {
            self.log(format_args!("Errors on {}. Not saving.", self.definition.name));
            for (_, message) in self.errors.iter() {
                host.add_error(&self.definition.name, message);
            }
            return Ok(false);
        }

        self.log(format_args!("Saving files for {}", self.definition.name));
        self.flush_deletes().await;
        self.flush_writes(host).await?;
        self.dirty = false;

        Ok(true)
    }

    async fn flush_deletes(&mut self) {
        for key in std::mem::take(&mut self.queued_for_delete) {
            debug!(attachment = %self.definition.name, key = %key, "Deleting stored file");
            if let Err(e) = self.storage.delete(&key).await {
                warn!(attachment = %self.definition.name, key = %key, error = %e, "Could not delete stored file");
            }
        }
    }

    async fn flush_writes(&mut self, host: &H) -> AttachmentResult<()> {
        for (style, artifact) in &self.queued_for_write {
            let key = self
                .path(host, Some(style.as_str()))?
                .ok_or_else(|| AttachmentError::unstorable(&self.definition.name, style))?;
            let data = artifact.read().await?;
            let metadata = self.storage.put(&key, data).await?;
            debug!(
                attachment = %self.definition.name,
                style = %style,
                key = %key,
                size = metadata.size,
                "Stored style"
            );
        }

        self.queued_for_write.clear();
        Ok(())
    }

    /// Fetch the stored original and process every style again, then save
    pub async fn reprocess(&mut self, host: &mut H) -> AttachmentResult<bool> {
        self.settle(host).await?;

        let Some(original) = self.to_file(host, ORIGINAL_STYLE).await? else {
            return Ok(true);
        };

        self.log(format_args!("Reprocessing {}", self.definition.name));
        self.queued_for_write.clear();
        self.queued_for_write
            .insert(ORIGINAL_STYLE.to_string(), Arc::new(original));
        self.reset_validation();
        self.solidify(host);
        self.post_process(host).await?;

        self.save(host).await
    }

    /// Delete every stored style and blank the host columns
    pub async fn destroy_all(&mut self, host: &mut H) -> AttachmentResult<()> {
        self.abandon_processing();
        self.queue_existing_for_delete(host).await?;
        self.queued_for_write.clear();
        self.flush_deletes().await;
        self.dirty = false;
        Ok(())
    }

    /// Copy a stored style into a temp file
    pub async fn to_file(&self, host: &H, style: &str) -> AttachmentResult<Option<Artifact>> {
        let Some(key) = self.path(host, Some(style))? else {
            return Ok(None);
        };

        let data = match self.storage.get(&key).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let extension = Path::new(&key).extension().and_then(|ext| ext.to_str());
        Ok(Some(Artifact::from_bytes(&data, extension).await?))
    }

    /// The stored original as an upload for another attachment
    pub async fn to_upload(&self, host: &H) -> AttachmentResult<Option<UploadedFile>> {
        let Some(artifact) = self.to_file(host, ORIGINAL_STYLE).await? else {
            return Ok(None);
        };

        Ok(Some(UploadedFile::from_artifact(
            artifact,
            self.original_filename(host).map(str::to_string),
            self.content_type(host).map(str::to_string),
        )))
    }
}

impl<H> std::fmt::Debug for Attachment<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.definition.name)
            .field("storage", &self.storage.name())
            .field("styles", &self.styles.keys().collect::<Vec<_>>())
            .field("queued_for_write", &self.queued_for_write.keys().collect::<Vec<_>>())
            .field("queued_for_delete", &self.queued_for_delete)
            .field("errors", &self.errors)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
