//! Fragmented MP4 (fMP4) demuxing.
//!
//! A fragmented file is one initialization segment (`ftyp`, `moov` and any
//! other boxes before the first fragment) followed by `moof`+`mdat` pairs:
//!
//! ```text
//! [ftyp][moov] | [moof][mdat] | [moof][mdat] | ...
//!  init segment   fragment 0     fragment 1
//! ```
//!
//! [`FragmentDemuxer`] reads that layout from any byte source. The free
//! functions here work on an in-memory prefix of a file.

mod demux;

pub use demux::{FragmentDemuxer, DEFAULT_MAX_INTERLEAVED};

use crate::mp4::{movie_duration_secs, AtomType, BoxHeader, BoxIter};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Initialization segment: every box preceding the first `moof`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitSegment {
    data: Bytes,
}

impl InitSegment {
    /// Wrap already-serialized init segment bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Serialized bytes (cheap to clone).
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Borrow the serialized bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes; also the file offset of the first fragment.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Movie duration announced by the init segment, if any.
    pub fn duration_secs(&self) -> Option<f64> {
        movie_duration_secs(&self.data)
    }
}

/// One `moof` box followed by its `mdat` box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    data: Bytes,
    moof_len: usize,
}

impl Fragment {
    /// Concatenate a serialized `moof` and `mdat`.
    pub fn new(moof: &[u8], mdat: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(moof.len() + mdat.len());
        data.put_slice(moof);
        data.put_slice(mdat);
        Self {
            data: data.freeze(),
            moof_len: moof.len(),
        }
    }

    /// Serialized `moof`+`mdat` bytes (cheap to clone).
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn moof(&self) -> &[u8] {
        &self.data[..self.moof_len]
    }

    pub fn mdat(&self) -> &[u8] {
        &self.data[self.moof_len..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Totals gathered by reading a whole fragmented file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FragmentSummary {
    /// Init segment size in bytes.
    pub init_size: usize,
    /// Number of `moof`+`mdat` fragments.
    pub fragment_count: usize,
    /// Sum of all fragment sizes in bytes.
    pub fragment_bytes: u64,
    /// Largest single fragment in bytes.
    pub largest_fragment: usize,
    /// Movie duration from the init segment, if announced.
    pub duration_secs: Option<f64>,
}

/// Extract the init segment from the leading bytes of a file.
///
/// Walks top-level boxes until a `moof` header is seen and returns
/// everything before it. The `moof` itself only needs its header inside
/// `prefix`. A box that runs past the end of `prefix` means the init segment
/// is larger than the probe window.
pub fn extract_init_segment(prefix: &[u8]) -> Result<InitSegment> {
    let mut pos = 0usize;

    while pos < prefix.len() {
        let rest = &prefix[pos..];
        let header = match BoxHeader::parse(rest) {
            Ok(Some(header)) => header,
            Ok(None) => return Err(Error::MissingFragment),
            Err(Error::TruncatedHeader { .. }) => {
                return Err(Error::InitTooLarge {
                    probe: prefix.len(),
                })
            }
            Err(e) => return Err(e),
        };

        if header.atom_type == AtomType::MOOF {
            return Ok(InitSegment::new(Bytes::copy_from_slice(&prefix[..pos])));
        }

        let size = header.size as usize;
        if size > rest.len() {
            return Err(Error::InitTooLarge {
                probe: prefix.len(),
            });
        }
        pos += size;
    }

    Err(Error::MissingFragment)
}

/// Whether `prefix` contains a top-level `moof` box header.
pub fn is_fragmented(prefix: &[u8]) -> bool {
    let mut iter = BoxIter::new(prefix);
    loop {
        let rest = &prefix[iter.position()..];
        if let Ok(Some(header)) = BoxHeader::parse(rest) {
            if header.atom_type == AtomType::MOOF {
                return true;
            }
        }
        if iter.next().is_none() {
            return false;
        }
    }
}
