//! Live broadcasting of one channel's current video to many viewers.
//!
//! Each channel owns a [`Broadcaster`]: a background pump reads fragments
//! from the current source file, paces them to a target bitrate and fans
//! them out to every attached [`ViewerSink`]. The source can be swapped
//! under active viewers with [`Broadcaster::switch_source`].

mod broadcaster;
mod pacer;
mod viewer;

pub use broadcaster::Broadcaster;
pub use pacer::Pacer;
pub use viewer::{ViewerSink, ViewerWriteError};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// What the pump is reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    /// Streaming the file at this path.
    Playing(PathBuf),
    /// The last source hit a demux fault; waiting for a new one.
    Fatal,
}

impl SourceState {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Playing(path) => Some(path),
            Self::Fatal => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

/// Errors from bringing up or re-sourcing a broadcaster.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Invalid construction parameters.
    #[error("Invalid broadcast configuration: {0}")]
    Config(String),

    /// The source is not a usable fragmented MP4.
    #[error("Failed to demux {path:?}: {source}")]
    Demux {
        path: PathBuf,
        #[source]
        source: channelcast_media::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
