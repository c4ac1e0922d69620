//! Sequential box reader.

use super::{AtomType, BoxHeader};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read};

/// One complete box, header included.
#[derive(Debug, Clone)]
pub struct Mp4Box {
    /// Parsed header.
    pub header: BoxHeader,
    /// Raw serialized bytes (header + payload).
    pub data: Bytes,
}

impl Mp4Box {
    /// Box type code.
    pub fn atom_type(&self) -> AtomType {
        self.header.atom_type
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the box serialized to zero bytes (never true for a parsed box).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Read the next box from `reader`.
///
/// Returns `Ok(None)` at a clean end of stream (no bytes left before a
/// header) and for a zero-size box. A stream ending partway through a header
/// or payload is an error.
pub fn read_box<R: Read>(reader: &mut R) -> Result<Option<Mp4Box>> {
    let mut header_buf = [0u8; BoxHeader::EXTENDED_LEN];

    let got = read_fill(reader, &mut header_buf[..BoxHeader::COMPACT_LEN])?;
    if got == 0 {
        return Ok(None);
    }
    if got < BoxHeader::COMPACT_LEN {
        return Err(Error::TruncatedHeader {
            need: BoxHeader::COMPACT_LEN,
            have: got,
        });
    }

    let mut header_len = BoxHeader::COMPACT_LEN;
    if BoxHeader::is_extended(&header_buf) {
        let ext = read_fill(reader, &mut header_buf[BoxHeader::COMPACT_LEN..])?;
        header_len += ext;
    }

    let header = match BoxHeader::parse(&header_buf[..header_len])? {
        Some(header) => header,
        None => return Ok(None),
    };

    let payload_size = header.payload_size();
    let mut data = BytesMut::with_capacity(header.size as usize);
    data.put_slice(&header_buf[..header.header_size as usize]);
    data.resize(header.size as usize, 0);

    reader
        .read_exact(&mut data[header.header_size as usize..])
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedBox {
                atom: header.atom_type.to_string(),
                need: payload_size,
            },
            _ => Error::Io(e),
        })?;

    Ok(Some(Mp4Box {
        header,
        data: data.freeze(),
    }))
}

/// Fill `buf` as far as the stream allows, returning the byte count.
fn read_fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
