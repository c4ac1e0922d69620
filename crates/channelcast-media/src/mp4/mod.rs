//! ISO-BMFF box layer.
//!
//! Box framing (compact and 64-bit sizes), sequential box reading over any
//! [`std::io::Read`] source, and movie duration probing from an init segment.

mod atoms;
mod duration;
mod reader;

pub use atoms::{AtomType, BoxHeader};
pub use duration::movie_duration_secs;
pub use reader::{read_box, Mp4Box};

pub(crate) use duration::BoxIter;
