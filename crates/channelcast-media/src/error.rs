//! Error types for channelcast-media.
//!
//! Every variant other than `Io` describes malformed box framing; callers
//! treat any of them as a demux failure for the file being read.

use std::io;
use thiserror::Error;

/// Result type for channelcast-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for channelcast-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended inside a box header.
    #[error("Truncated box header: got {have} of {need} bytes")]
    TruncatedHeader { need: usize, have: usize },

    /// The stream ended inside a box payload.
    #[error("Truncated {atom} box: payload of {need} bytes, stream ended early")]
    TruncatedBox { atom: String, need: u64 },

    /// Declared box size is smaller than its header or absurdly large.
    #[error("Invalid size {size} for {atom} box")]
    InvalidBoxSize { atom: String, size: u64 },

    /// No `moof` box was found, so there is no initialization segment boundary.
    #[error("No moof box found; not a fragmented MP4")]
    MissingFragment,

    /// A `moof` box was never followed by an `mdat` box.
    #[error("moof box not followed by mdat within {skipped} boxes")]
    MissingMdat { skipped: usize },

    /// The initialization segment does not fit inside the probed prefix.
    #[error("Initialization segment exceeds probe window of {probe} bytes")]
    InitTooLarge { probe: usize },
}

impl Error {
    /// Whether the error came from the underlying byte source rather than the
    /// box structure itself.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
