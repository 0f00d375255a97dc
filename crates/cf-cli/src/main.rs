//! Clipfile RS command-line tool
//!
//! Manages the attachments of host records stored as JSON files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cf_attachments::{AssignOutcome, Attachment, AttachmentContext, Upload, UploadedFile};
use cf_core::Id;

mod record;
mod settings;

use record::RecordFile;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "clipfile",
    version,
    about = "Attach, process and serve files for JSON host records",
    long_about = None
)]
struct Cli {
    /// Settings file path.
    #[arg(short, long, value_name = "PATH", env = "CLIPFILE_CONFIG")]
    config: Option<PathBuf>,

    /// Host record file.
    #[arg(short, long, value_name = "PATH")]
    record: PathBuf,

    /// Model name for a record file that does not exist yet.
    #[arg(long)]
    model: Option<String>,

    /// Record id.
    #[arg(long)]
    id: Option<Id>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assign a file, process its styles and save it.
    Assign {
        attachment: String,
        file: PathBuf,
        /// Content type, guessed from the file name when omitted.
        #[arg(long)]
        content_type: Option<String>,
        /// File name recorded instead of the path's.
        #[arg(long)]
        filename: Option<String>,
    },
    /// Remove the current file and every style.
    Clear { attachment: String },
    /// Process every style again from the stored original.
    Reprocess { attachment: String },
    /// Print the public URL of a style.
    Url {
        attachment: String,
        #[arg(long)]
        style: Option<String>,
        /// Append the last update time.
        #[arg(long)]
        timestamp: bool,
    },
    /// Print the storage path of a style.
    Path {
        attachment: String,
        #[arg(long)]
        style: Option<String>,
    },
    /// Delete every stored style and blank the record's columns.
    Destroy { attachment: String },
}

impl Command {
    fn attachment(&self) -> &str {
        match self {
            Self::Assign { attachment, .. }
            | Self::Clear { attachment }
            | Self::Reprocess { attachment }
            | Self::Url { attachment, .. }
            | Self::Path { attachment, .. }
            | Self::Destroy { attachment } => attachment,
        }
    }

    /// Commands that leave the record file untouched
    fn is_read_only(&self) -> bool {
        matches!(self, Self::Url { .. } | Self::Path { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        record = %cli.record.display(),
        root = %settings.environment.root.display(),
        env = %settings.environment.name,
        "Starting clipfile"
    );

    let attachment = cli.command.attachment().to_string();
    let (output, ok) = run(cli, &settings).await?;

    match output {
        Value::String(line) => println!("{line}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }

    if !ok {
        anyhow::bail!("{attachment} has errors");
    }
    Ok(())
}

/// Initialize tracing/logging on stderr, leaving stdout for results
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cf_cli=debug,cf_attachments=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}

/// Load the record, run the command and write the record back.
///
/// The record file is left as it was when the command is read-only or the
/// attachment fails to save, so it keeps naming the files in storage.
async fn run(cli: Cli, settings: &Settings) -> anyhow::Result<(Value, bool)> {
    let read_only = cli.command.is_read_only();

    let mut record = RecordFile::load_or_create(&cli.record, cli.model.as_deref(), cli.id).await?;
    let (output, ok) = execute(cli.command, settings, &mut record).await?;

    if ok && !read_only {
        record.store(&cli.record).await?;
    } else if !ok {
        warn!(record = %cli.record.display(), "Record not written");
    }

    Ok((output, ok))
}

/// Run one command against the record. Returns the output and whether the record is valid.
async fn execute(
    command: Command,
    settings: &Settings,
    record: &mut RecordFile,
) -> anyhow::Result<(Value, bool)> {
    let name = command.attachment().to_string();
    let definition = Arc::new(settings.definition::<RecordFile>(&name)?);
    let context = AttachmentContext::new(settings.options.clone(), settings.environment.clone());

    record.ensure_attachment(&name);
    record.errors.clear();
    let mut attachment = Attachment::new(definition, context, record)?;

    match command {
        Command::Assign {
            file,
            content_type,
            filename,
            ..
        } => {
            let mut upload = UploadedFile::from_path(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            if let Some(content_type) = content_type {
                upload = upload.with_content_type(content_type);
            }
            if let Some(filename) = filename {
                upload = upload.with_filename(filename);
            }

            let outcome = attachment.assign(record, upload).await?;
            if outcome == AssignOutcome::Rejected {
                anyhow::bail!("{} needs a file name and a content type", file.display());
            }
            let saved = attachment.save(record).await?;
            Ok((summary(&mut attachment, record, saved).await?, saved))
        }
        Command::Clear { .. } => {
            attachment.assign(record, Upload::Clear).await?;
            let saved = attachment.save(record).await?;
            Ok((summary(&mut attachment, record, saved).await?, saved))
        }
        Command::Reprocess { .. } => {
            let saved = attachment.reprocess(record).await?;
            Ok((summary(&mut attachment, record, saved).await?, saved))
        }
        Command::Url {
            style, timestamp, ..
        } => {
            let url = attachment
                .url(record, style.as_deref(), timestamp)
                .await?;
            Ok((Value::String(url), true))
        }
        Command::Path { style, .. } => {
            let path = attachment
                .path(record, style.as_deref())?
                .with_context(|| format!("{name} has no file"))?;
            Ok((Value::String(path), true))
        }
        Command::Destroy { .. } => {
            attachment.destroy_all(record).await?;
            Ok((summary(&mut attachment, record, true).await?, true))
        }
    }
}

async fn summary(
    attachment: &mut Attachment<RecordFile>,
    record: &mut RecordFile,
    saved: bool,
) -> anyhow::Result<Value> {
    let mut urls = serde_json::Map::new();
    for style in attachment.definition().style_names() {
        let url = attachment.url(record, Some(&style), false).await?;
        urls.insert(style, Value::String(url));
    }

    let errors: Vec<Value> = attachment
        .errors()
        .iter()
        .map(|(kind, message)| json!({ "kind": kind, "message": message }))
        .collect();

    Ok(json!({
        "attachment": attachment.name(),
        "saved": saved,
        "file_name": attachment.original_filename(record),
        "content_type": attachment.content_type(record),
        "file_size": attachment.size(record),
        "updated_at": attachment.updated_at(record),
        "urls": urls,
        "errors": errors,
    }))
}
