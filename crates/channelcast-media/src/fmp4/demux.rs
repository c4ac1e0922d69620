//! Streaming demuxer over a byte source.

use super::{Fragment, FragmentSummary, InitSegment};
use crate::mp4::{read_box, AtomType};
use crate::{Error, Result};
use bytes::BytesMut;
use std::io::{Read, Seek, SeekFrom};

/// Boxes tolerated between a `moof` and its `mdat` before giving up.
pub const DEFAULT_MAX_INTERLEAVED: usize = 8;

/// Splits a fragmented MP4 stream into an init segment and fragments.
///
/// The demuxer holds no state besides the read position of the underlying
/// source, so the same source can be re-wrapped at any box boundary.
pub struct FragmentDemuxer<R> {
    reader: R,
    max_interleaved: usize,
}

impl<R: Read> FragmentDemuxer<R> {
    /// Create a demuxer reading from the current position of `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_interleaved: DEFAULT_MAX_INTERLEAVED,
        }
    }

    /// Limit how many non-`mdat` boxes may sit between a `moof` and its `mdat`.
    pub fn with_max_interleaved(mut self, max: usize) -> Self {
        self.max_interleaved = max;
        self
    }

    /// Access the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next `moof`+`mdat` fragment.
    ///
    /// Boxes other than `moof` are skipped. Once a `moof` is found, boxes
    /// between it and the following `mdat` are dropped; a newer `moof`
    /// replaces an orphaned one. Returns `Ok(None)` at end of stream.
    pub fn next_fragment(&mut self) -> Result<Option<Fragment>> {
        loop {
            let moof = match read_box(&mut self.reader)? {
                Some(b) => b,
                None => return Ok(None),
            };
            if moof.atom_type() != AtomType::MOOF {
                continue;
            }

            let mut pending = moof;
            let mut skipped = 0usize;
            loop {
                let next = match read_box(&mut self.reader)? {
                    Some(b) => b,
                    None => return Ok(None),
                };
                match next.atom_type() {
                    AtomType::MDAT => {
                        return Ok(Some(Fragment::new(&pending.data, &next.data)));
                    }
                    AtomType::MOOF => {
                        pending = next;
                        skipped += 1;
                    }
                    _ => skipped += 1,
                }
                if skipped > self.max_interleaved {
                    return Err(Error::MissingMdat { skipped });
                }
            }
        }
    }
}

impl<R: Read + Seek> FragmentDemuxer<R> {
    /// Read boxes from the current position up to the first `moof`.
    ///
    /// The reader is rewound to the start of that `moof`, so the next call to
    /// [`next_fragment`](Self::next_fragment) returns the first fragment.
    pub fn read_init_segment(&mut self) -> Result<InitSegment> {
        let mut init = BytesMut::new();
        loop {
            let mp4_box = match read_box(&mut self.reader)? {
                Some(b) => b,
                None => return Err(Error::MissingFragment),
            };
            if mp4_box.atom_type() == AtomType::MOOF {
                self.reader
                    .seek(SeekFrom::Current(-(mp4_box.len() as i64)))?;
                return Ok(InitSegment::new(init.freeze()));
            }
            init.extend_from_slice(&mp4_box.data);
        }
    }

    /// Position the reader at an absolute byte offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read the whole stream from the start and total it up.
    pub fn summarize(mut self) -> Result<FragmentSummary> {
        self.seek_to(0)?;
        let init = self.read_init_segment()?;

        let mut summary = FragmentSummary {
            init_size: init.len(),
            fragment_count: 0,
            fragment_bytes: 0,
            largest_fragment: 0,
            duration_secs: init.duration_secs(),
        };

        while let Some(fragment) = self.next_fragment()? {
            summary.fragment_count += 1;
            summary.fragment_bytes += fragment.len() as u64;
            summary.largest_fragment = summary.largest_fragment.max(fragment.len());
        }

        Ok(summary)
    }
}
