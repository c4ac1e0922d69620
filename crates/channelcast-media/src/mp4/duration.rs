//! Movie duration probing from `moov/mvhd` and `moov/mvex/mehd`.

use super::{AtomType, BoxHeader};

/// Iterator over the boxes laid out back to back in a byte slice.
///
/// Yields `(header, payload)` pairs and stops at the first header that does
/// not parse or a box that overruns the slice.
pub(crate) struct BoxIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Byte offset of the next box to be yielded.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = (BoxHeader, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        let header = BoxHeader::parse(rest).ok().flatten()?;
        let size = usize::try_from(header.size).ok()?;
        if size > rest.len() {
            return None;
        }
        self.pos += size;
        Some((header, &rest[header.header_size as usize..size]))
    }
}

/// Movie duration in seconds, read from an initialization segment.
///
/// Uses the `mvhd` duration, falling back to the `mehd` fragment duration
/// when the movie header reports zero (the usual case for fragmented files
/// written with an empty moov). Returns `None` when neither is usable.
pub fn movie_duration_secs(init: &[u8]) -> Option<f64> {
    let (_, moov) = BoxIter::new(init).find(|(h, _)| h.atom_type == AtomType::MOOV)?;

    let mut timescale = 0u32;
    let mut duration = 0u64;
    let mut fragment_duration = 0u64;

    for (header, payload) in BoxIter::new(moov) {
        match header.atom_type {
            AtomType::MVHD => {
                if let Some((ts, d)) = parse_mvhd(payload) {
                    timescale = ts;
                    duration = d;
                }
            }
            AtomType::MVEX => {
                if let Some((_, mehd)) =
                    BoxIter::new(payload).find(|(h, _)| h.atom_type == AtomType::MEHD)
                {
                    fragment_duration = parse_mehd(mehd).unwrap_or(0);
                }
            }
            _ => {}
        }
    }

    if timescale == 0 {
        return None;
    }

    let units = if duration > 0 {
        duration
    } else {
        fragment_duration
    };
    if units == 0 {
        return None;
    }

    Some(units as f64 / timescale as f64)
}

/// Returns `(timescale, duration)` from an `mvhd` payload.
fn parse_mvhd(data: &[u8]) -> Option<(u32, u64)> {
    let version = *data.first()?;
    if version == 0 {
        // 32-bit timestamps
        let ts = data.get(12..16)?;
        let d = data.get(16..20)?;
        Some((
            u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]),
            u32::from_be_bytes([d[0], d[1], d[2], d[3]]) as u64,
        ))
    } else {
        // 64-bit timestamps
        let ts = data.get(20..24)?;
        let d = data.get(24..32)?;
        let mut dur = [0u8; 8];
        dur.copy_from_slice(d);
        Some((
            u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]),
            u64::from_be_bytes(dur),
        ))
    }
}

/// Returns the fragment duration from an `mehd` payload.
fn parse_mehd(data: &[u8]) -> Option<u64> {
    let version = *data.first()?;
    if version == 0 {
        let d = data.get(4..8)?;
        Some(u32::from_be_bytes([d[0], d[1], d[2], d[3]]) as u64)
    } else {
        let d = data.get(4..12)?;
        let mut dur = [0u8; 8];
        dur.copy_from_slice(d);
        Some(u64::from_be_bytes(dur))
    }
}
