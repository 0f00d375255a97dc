//! Processing errors

use std::time::Duration;
use thiserror::Error;

/// External command failures
#[derive(Debug, Error)]
pub enum CommandLineError {
    #[error("Could not run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while running {command} (exit code {code:?}){}", stderr_suffix(.stderr))]
    UnexpectedExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Errors raised while turning an original into a style artifact
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Processor {0} was not found")]
    ProcessorNotFound(String),

    #[error("Style {0} has no processors defined")]
    NoProcessorsDefined(String),

    #[error("There was an error processing the {processor} for {file}: {source}")]
    CommandLine {
        processor: String,
        file: String,
        #[source]
        source: CommandLineError,
    },

    #[error("{0} is not recognized by the 'identify' command")]
    NotIdentified(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

impl ProcessingError {
    pub fn command_line(
        processor: impl Into<String>,
        file: impl Into<String>,
        source: CommandLineError,
    ) -> Self {
        Self::CommandLine {
            processor: processor.into(),
            file: file.into(),
            source,
        }
    }

    /// Whether this error reflects configuration rather than the file being processed
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ProcessorNotFound(_))
    }
}
