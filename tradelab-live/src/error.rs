//! Live-side error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use tradelab_core::config::ConfigError;
use tradelab_core::data::DataError;

/// A signal consumer failed. Isolated to that consumer.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("failed to encode signal")]
    Encode(#[from] serde_json::Error),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Market data feed failures.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no data for instrument '{0}'")]
    UnknownInstrument(String),

    #[error("feed worker failed: {0}")]
    Worker(String),
}

/// The configuration source could not be read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a live strategy task stopped abnormally.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("feed stalled: no bar for {}s", .0.as_secs())]
    Stalled(Duration),
}

/// How a strategy task ended.
#[derive(Debug)]
pub enum TaskExit {
    /// Stopped cooperatively. Not a failure.
    Cancelled,
    /// The bar stream closed.
    StreamEnded,
    Failed(LiveError),
}

impl TaskExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskExit::Failed(_))
    }
}

impl std::fmt::Display for TaskExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskExit::Cancelled => write!(f, "cancelled"),
            TaskExit::StreamEnded => write!(f, "stream ended"),
            TaskExit::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}
