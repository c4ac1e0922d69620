//! Box header definitions and parsing.

use crate::{Error, Result};

/// Largest box this crate will buffer in memory (256 MB).
const MAX_BOX_SIZE: u64 = 256 * 1024 * 1024;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MEHD: Self = Self(*b"mehd");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");
    pub const SIDX: Self = Self(*b"sidx");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type code.
    pub atom_type: AtomType,
    /// Total box size including the header.
    pub size: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl BoxHeader {
    /// Length of the compact header (size + type).
    pub const COMPACT_LEN: usize = 8;
    /// Length of the header when a 64-bit size follows the type.
    pub const EXTENDED_LEN: usize = 16;

    /// Parse a header from the start of `buf`.
    ///
    /// Returns `Ok(None)` for a zero size field: a box running to the end of
    /// the stream is treated as the end of the stream. `buf` must hold at
    /// least 8 bytes, and 16 when the size field is `1`.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < Self::COMPACT_LEN {
            return Err(Error::TruncatedHeader {
                need: Self::COMPACT_LEN,
                have: buf.len(),
            });
        }

        let size32 = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64;
        let atom_type = AtomType::from_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let (size, header_size) = match size32 {
            0 => return Ok(None),
            1 => {
                if buf.len() < Self::EXTENDED_LEN {
                    return Err(Error::TruncatedHeader {
                        need: Self::EXTENDED_LEN,
                        have: buf.len(),
                    });
                }
                let mut ext = [0u8; 8];
                ext.copy_from_slice(&buf[8..16]);
                (u64::from_be_bytes(ext), Self::EXTENDED_LEN as u8)
            }
            n => (n, Self::COMPACT_LEN as u8),
        };

        if size < header_size as u64 || size > MAX_BOX_SIZE {
            return Err(Error::InvalidBoxSize {
                atom: atom_type.to_string(),
                size,
            });
        }

        Ok(Some(Self {
            atom_type,
            size,
            header_size,
        }))
    }

    /// Whether the size field announces a 64-bit extended size.
    pub fn is_extended(buf: &[u8]) -> bool {
        buf.len() >= 4 && u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) == 1
    }

    /// Payload size (size - header).
    pub fn payload_size(&self) -> u64 {
        self.size - self.header_size as u64
    }
}
