use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cf_attachments::{
    AssignOutcome, Attachment, AttachmentContext, AttachmentDefinition, AttachmentError,
    PartialStyle, ProcessingMode, StyleDefinition, Upload, UploadedFile, Validation,
    PROCESSING_ERRORS,
};
use cf_core::{AttachmentColumns, AttachmentOptions, Environment, HostRecord, Id};
use cf_processing::{
    Artifact, CommandLineError, CommandRunner, ProcessingError, ProcessingResult, Processor,
    ResolvedStyle,
};
use cf_storage::{MemoryStorage, Storage};
use regex::Regex;

struct Record {
    id: Option<Id>,
    columns: HashMap<String, AttachmentColumns>,
    errors: Vec<(String, String)>,
    veto_processing: bool,
    after_calls: usize,
}

impl Record {
    fn new(id: Id, attachments: &[&str]) -> Self {
        Self {
            id: Some(id),
            columns: attachments
                .iter()
                .map(|name| (name.to_string(), AttachmentColumns::new()))
                .collect(),
            errors: Vec::new(),
            veto_processing: false,
            after_calls: 0,
        }
    }

    fn avatar(&self) -> &AttachmentColumns {
        &self.columns["avatar"]
    }
}

impl HostRecord for Record {
    fn model_name(&self) -> &str {
        "User"
    }

    fn id(&self) -> Option<Id> {
        self.id
    }

    fn columns(&self, attachment: &str) -> Option<&AttachmentColumns> {
        self.columns.get(attachment)
    }

    fn columns_mut(&mut self, attachment: &str) -> Option<&mut AttachmentColumns> {
        self.columns.get_mut(attachment)
    }

    fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push((field.to_string(), message.to_string()));
    }

    fn before_post_process(&mut self, _attachment: &str) -> bool {
        !self.veto_processing
    }

    fn after_post_process(&mut self, _attachment: &str) -> bool {
        self.after_calls += 1;
        true
    }
}

/// Copies the source and tags it with the style name
struct Tag;

#[async_trait]
impl Processor for Tag {
    async fn make(
        &self,
        source: &Artifact,
        style: &ResolvedStyle,
        _runner: &dyn CommandRunner,
    ) -> ProcessingResult<Artifact> {
        let mut data = source.read().await?.to_vec();
        data.extend_from_slice(format!("+{}", style.name).as_bytes());
        let extension = style.format.as_deref().or(source.extension());
        Ok(Artifact::from_bytes(&data, extension).await?)
    }
}

struct Fail;

#[async_trait]
impl Processor for Fail {
    async fn make(
        &self,
        source: &Artifact,
        _style: &ResolvedStyle,
        _runner: &dyn CommandRunner,
    ) -> ProcessingResult<Artifact> {
        Err(ProcessingError::command_line(
            "thumbnail",
            source.basename(),
            CommandLineError::UnexpectedExit {
                command: "convert".to_string(),
                code: Some(1),
                stderr: String::new(),
            },
        ))
    }
}

struct Fixture {
    attachment: Attachment<Record>,
    host: Record,
    storage: Arc<MemoryStorage>,
}

fn context(storage: Arc<MemoryStorage>) -> AttachmentContext<Record> {
    AttachmentContext::new(
        AttachmentOptions::default().with_log(false),
        Environment::new("/srv/app", "test"),
    )
    .with_shared_storage("filesystem", storage)
    .with_processor("thumbnail", Tag)
    .with_processor("fail", Fail)
}

fn fixture(definition: AttachmentDefinition<Record>) -> Fixture {
    let storage = Arc::new(MemoryStorage::new());
    let host = Record::new(1, &["avatar", "backup"]);
    let attachment = Attachment::new(Arc::new(definition), context(storage.clone()), &host).unwrap();
    Fixture {
        attachment,
        host,
        storage,
    }
}

fn avatar() -> AttachmentDefinition<Record> {
    AttachmentDefinition::new("avatar").with_style("thumb", "100x100!")
}

fn jpeg(name: &str, size: usize) -> UploadedFile {
    UploadedFile::new(name, "image/jpeg", vec![0xFFu8; size])
}

const ORIGINAL_KEY: &str = "/srv/app/public/uploads/1_Photo_One.jpg";
const THUMB_KEY: &str = "/srv/app/public/uploads/1_thumb_Photo_One.jpg";

#[tokio::test]
async fn assign_and_save_writes_every_style() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    let outcome = attachment
        .assign(&mut host, jpeg("Photo One.jpg", 2 * 1024 * 1024))
        .await
        .unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned);

    assert_eq!(host.avatar().file_name.as_deref(), Some("Photo_One.jpg"));
    assert_eq!(host.avatar().content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(host.avatar().file_size, Some(2 * 1024 * 1024));
    assert!(host.avatar().updated_at.is_some());
    assert!(attachment.is_dirty());
    assert_eq!(
        attachment.queued_for_write().keys().collect::<Vec<_>>(),
        vec!["original", "thumb"]
    );
    assert!(storage.is_empty().await);

    assert!(attachment.save(&mut host).await.unwrap());

    assert!(!attachment.is_dirty());
    assert!(attachment.exists(&host));
    assert!(attachment.queued_for_write().is_empty());
    assert_eq!(storage.keys().await, vec![ORIGINAL_KEY, THUMB_KEY]);

    let original = attachment.path(&host, Some("original")).unwrap().unwrap();
    assert_eq!(storage.get(&original).await.unwrap().len(), 2 * 1024 * 1024);
    let thumb = storage.get(THUMB_KEY).await.unwrap();
    assert!(thumb.ends_with(b"+thumb"));
}

#[tokio::test]
async fn oversized_upload_is_not_saved() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar().with_validation(Validation::max_size(1024)));

    attachment.assign(&mut host, jpeg("big.jpg", 2048)).await.unwrap();

    // Invalid uploads are not processed
    assert_eq!(
        attachment.queued_for_write().keys().collect::<Vec<_>>(),
        vec!["original"]
    );
    assert!(!attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
    assert_eq!(
        host.errors,
        vec![(
            "avatar".to_string(),
            "file size must be between 0 and 1024 bytes".to_string()
        )]
    );
}

#[tokio::test]
async fn failed_save_keeps_queues_for_retry() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar().with_validation(Validation::max_size(1024)));

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    assert!(attachment.save(&mut host).await.unwrap());

    attachment.assign(&mut host, jpeg("big.jpg", 2048)).await.unwrap();
    let writes: Vec<String> = attachment.queued_for_write().keys().cloned().collect();
    let deletes = attachment.queued_for_delete().to_vec();
    assert_eq!(writes, vec!["original"]);
    assert_eq!(deletes, vec![ORIGINAL_KEY, THUMB_KEY]);

    assert!(!attachment.save(&mut host).await.unwrap());
    assert!(attachment.is_dirty());
    assert_eq!(
        attachment.queued_for_write().keys().cloned().collect::<Vec<_>>(),
        writes
    );
    assert_eq!(attachment.queued_for_delete(), deletes.as_slice());
    assert_eq!(storage.keys().await, vec![ORIGINAL_KEY, THUMB_KEY]);
}

#[tokio::test]
async fn content_type_validation() {
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(avatar().with_validation(Validation::content_type([Regex::new(r"^image/png$").unwrap()])));

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert!(!attachment.is_valid(&mut host).await.unwrap());
    assert_eq!(
        attachment.errors().get("content_type"),
        Some(&vec!["is not one of the allowed file types".to_string()])
    );
}

#[tokio::test]
async fn presence_validation_after_clear() {
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(avatar().with_validation(Validation::presence()));

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert!(attachment.is_valid(&mut host).await.unwrap());

    attachment.assign(&mut host, Upload::Clear).await.unwrap();
    assert!(!attachment.is_valid(&mut host).await.unwrap());
    assert!(attachment.errors().has_error("presence"));
}

#[tokio::test]
async fn id_partition_and_format_override() {
    let definition = AttachmentDefinition::new("avatar")
        .with_path(":class/:id_partition/:style_:basename.:extension")
        .with_style("icon", StyleDefinition::geometry_with_format("32x32", "png"));
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(definition);
    host.id = Some(7);

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert_eq!(
        attachment.path(&host, None).unwrap().as_deref(),
        Some("users/000/000/007/photo.jpg")
    );
    assert_eq!(
        attachment.path(&host, Some("icon")).unwrap().as_deref(),
        Some("users/000/000/007/icon_photo.png")
    );

    assert!(attachment.save(&mut host).await.unwrap());
    assert_eq!(
        storage.keys().await,
        vec!["users/000/000/007/icon_photo.png", "users/000/000/007/photo.jpg"]
    );
}

#[tokio::test]
async fn empty_processor_chain_records_error() {
    let definition = avatar().with_style(
        "bare",
        PartialStyle::new("10x10").with_processors(Vec::<String>::new()),
    );
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(definition);

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();

    assert_eq!(
        attachment.errors().get(PROCESSING_ERRORS),
        Some(&vec!["Style bare has no processors defined".to_string()])
    );
    assert_eq!(
        attachment.queued_for_write().keys().collect::<Vec<_>>(),
        vec!["original", "thumb"]
    );
    assert!(!attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn url_falls_back_to_original_for_failed_style() {
    let definition = avatar().with_style(
        "broken",
        PartialStyle::new("10x10").with_processors(["fail"]),
    );
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(definition);

    assert_eq!(
        attachment.url(&mut host, Some("thumb"), true).await.unwrap(),
        "/images/backend/no-image.png"
    );

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    assert!(attachment.errors().is_empty());
    assert!(attachment.save(&mut host).await.unwrap());

    assert_eq!(
        attachment.url(&mut host, Some("broken"), false).await.unwrap(),
        "/uploads/1_Photo_One.jpg"
    );
    assert_eq!(
        attachment.url(&mut host, Some("thumb"), false).await.unwrap(),
        "/uploads/1_thumb_Photo_One.jpg"
    );

    let timestamp = host.avatar().updated_at.unwrap().timestamp();
    assert_eq!(
        attachment.url(&mut host, None, true).await.unwrap(),
        format!("/uploads/1_Photo_One.jpg?{timestamp}")
    );
}

#[tokio::test]
async fn whiny_style_failure_blocks_save() {
    let definition = avatar().with_whiny(true).with_style(
        "broken",
        PartialStyle::new("10x10").with_processors(["fail"]),
    );
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(definition);

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();

    let messages = attachment.errors().get(PROCESSING_ERRORS).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("There was an error processing the thumbnail for"));
    assert!(!attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn unknown_processor_fails_assign() {
    let definition = avatar().with_style(
        "marked",
        PartialStyle::new("10x10").with_processors(["watermark"]),
    );
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(definition);

    let result = attachment.assign(&mut host, jpeg("photo.jpg", 10)).await;
    assert!(matches!(
        result,
        Err(AttachmentError::Processing(ProcessingError::ProcessorNotFound(name))) if name == "watermark"
    ));
    // No style ran
    assert_eq!(
        attachment.queued_for_write().keys().collect::<Vec<_>>(),
        vec!["original"]
    );
}

#[tokio::test]
async fn reassign_replaces_stored_files() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    assert!(attachment.save(&mut host).await.unwrap());

    attachment.assign(&mut host, jpeg("second.jpg", 20)).await.unwrap();
    assert_eq!(attachment.queued_for_delete(), &[ORIGINAL_KEY, THUMB_KEY]);

    assert!(attachment.save(&mut host).await.unwrap());
    assert!(attachment.queued_for_delete().is_empty());
    assert_eq!(
        storage.keys().await,
        vec![
            "/srv/app/public/uploads/1_second.jpg",
            "/srv/app/public/uploads/1_thumb_second.jpg",
        ]
    );
}

#[tokio::test]
async fn clear_queues_deletes() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    attachment.save(&mut host).await.unwrap();

    let outcome = attachment.assign(&mut host, None::<UploadedFile>).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Cleared);
    assert!(attachment.is_dirty());
    assert_eq!(host.avatar(), &AttachmentColumns::default());
    assert_eq!(attachment.queued_for_delete().len(), 2);

    assert!(attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
    assert!(!attachment.exists(&host));
}

#[tokio::test]
async fn clear_before_save_leaves_nothing_pending() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    assert!(attachment.is_dirty());

    let outcome = attachment.assign(&mut host, Upload::Clear).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Cleared);
    assert!(attachment.queued_for_write().is_empty());
    assert!(attachment.queued_for_delete().is_empty());
    assert!(!attachment.is_dirty());

    assert!(attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn blank_file_name_is_rejected() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    for name in ["", "   "] {
        let outcome = attachment.assign(&mut host, jpeg(name, 10)).await.unwrap();
        assert_eq!(outcome, AssignOutcome::Rejected, "{name:?}");
        assert!(!attachment.exists(&host));
        assert!(!attachment.is_dirty());
        assert!(attachment.queued_for_write().is_empty());
    }

    assert!(attachment.save(&mut host).await.unwrap());
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn save_fails_when_a_queued_style_has_no_key() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    host.columns.get_mut("avatar").unwrap().file_name = None;

    let result = attachment.save(&mut host).await;
    assert!(matches!(
        result,
        Err(AttachmentError::Unstorable { ref style, .. }) if style == "original"
    ));
    assert!(storage.is_empty().await);
    assert_eq!(attachment.queued_for_write().len(), 2);
}

#[tokio::test]
async fn upload_without_content_type_is_rejected() {
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(avatar());

    let mut upload = jpeg("photo.jpg", 10);
    upload.content_type = None;

    let outcome = attachment.assign(&mut host, upload).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Rejected);
    assert!(!attachment.exists(&host));
    assert!(!attachment.is_dirty());
    assert!(attachment.queued_for_write().is_empty());
}

#[tokio::test]
async fn before_hook_vetoes_processing() {
    let Fixture {
        mut attachment,
        mut host,
        ..
    } = fixture(avatar());
    host.veto_processing = true;

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert_eq!(
        attachment.queued_for_write().keys().collect::<Vec<_>>(),
        vec!["original"]
    );
    assert_eq!(host.after_calls, 0);
}

#[tokio::test]
async fn original_style_replaces_original() {
    let definition = avatar().with_style("original", "2000x2000>");
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(definition);

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert_eq!(host.avatar().file_size, Some(10 + "+original".len() as u64));

    attachment.save(&mut host).await.unwrap();
    let stored = storage.get("/srv/app/public/uploads/1_photo.jpg").await.unwrap();
    assert!(stored.ends_with(b"+original"));
}

#[tokio::test]
async fn background_processing_settles_on_save() {
    let definition = avatar()
        .with_style("small", "50x50")
        .with_processing(ProcessingMode::Background);
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(definition);

    attachment.assign(&mut host, jpeg("photo.jpg", 10)).await.unwrap();
    assert!(attachment.is_processing());
    assert_eq!(host.after_calls, 0);

    assert!(attachment.save(&mut host).await.unwrap());
    assert!(!attachment.is_processing());
    assert_eq!(host.after_calls, 1);
    assert_eq!(storage.len().await, 3);
}

#[tokio::test]
async fn reprocess_regenerates_styles() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    // Nothing to do without a file
    assert!(attachment.reprocess(&mut host).await.unwrap());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    attachment.save(&mut host).await.unwrap();
    storage.delete(THUMB_KEY).await.unwrap();

    assert!(attachment.reprocess(&mut host).await.unwrap());
    assert_eq!(storage.keys().await, vec![ORIGINAL_KEY, THUMB_KEY]);
}

#[tokio::test]
async fn destroy_all_removes_everything() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    attachment.save(&mut host).await.unwrap();

    attachment.destroy_all(&mut host).await.unwrap();
    assert!(storage.is_empty().await);
    assert!(!attachment.exists(&host));
    assert!(attachment.path(&host, None).unwrap().is_none());
}

#[tokio::test]
async fn cross_copy_between_attachments() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());
    let backup_definition = Arc::new(AttachmentDefinition::new("backup").with_path("backups/:id/:basename.:extension"));
    let mut backup = Attachment::new(backup_definition, context(storage.clone()), &host).unwrap();

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    attachment.save(&mut host).await.unwrap();

    let upload = attachment.to_upload(&host).await.unwrap().unwrap();
    assert_eq!(upload.original_filename.as_deref(), Some("Photo_One.jpg"));
    assert_eq!(upload.content_type.as_deref(), Some("image/jpeg"));

    backup.assign(&mut host, upload).await.unwrap();
    assert!(backup.save(&mut host).await.unwrap());

    let copied = storage.get("backups/1/Photo_One.jpg").await.unwrap();
    assert_eq!(copied, storage.get(ORIGINAL_KEY).await.unwrap());
    // The source attachment is untouched
    assert!(storage.exists(ORIGINAL_KEY).await.unwrap());
}

#[tokio::test]
async fn caller_bytes_are_not_consumed() {
    let Fixture {
        mut attachment,
        mut host,
        storage,
    } = fixture(avatar());
    let data = Bytes::from_static(b"caller owned");

    attachment
        .assign(&mut host, UploadedFile::new("note.txt", "text/plain", data.clone()))
        .await
        .unwrap();
    attachment.save(&mut host).await.unwrap();

    assert_eq!(data, Bytes::from_static(b"caller owned"));
    assert_eq!(
        storage.get("/srv/app/public/uploads/1_note.txt").await.unwrap(),
        data
    );
}

#[tokio::test]
async fn filesystem_storage_under_root() {
    let root = tempfile::tempdir().unwrap();
    let context = AttachmentContext::new(
        AttachmentOptions::default().with_log(false),
        Environment::new(root.path(), "test"),
    )
    .with_processor("thumbnail", Tag);
    let mut host = Record::new(3, &["avatar"]);
    let mut attachment = Attachment::new(Arc::new(avatar()), context, &host).unwrap();

    attachment.assign(&mut host, jpeg("Photo One.jpg", 10)).await.unwrap();
    assert!(attachment.save(&mut host).await.unwrap());

    let uploads = root.path().join("public").join("uploads");
    assert!(uploads.join("3_Photo_One.jpg").exists());
    assert!(uploads.join("3_thumb_Photo_One.jpg").exists());
    assert_eq!(
        attachment.url(&mut host, Some("thumb"), false).await.unwrap(),
        "/uploads/3_thumb_Photo_One.jpg"
    );
}
