//! Channelcast-Media: ISO-BMFF box framing and fragmented MP4 demuxing.
//!
//! This crate turns a fragmented MP4 byte stream into the two pieces a live
//! broadcaster needs: the initialization segment (every box preceding the
//! first `moof`) and a lazy sequence of `moof`+`mdat` fragments.
//!
//! # Modules
//!
//! - `mp4` - Box headers, four-character codes, movie duration probing
//! - `fmp4` - Init segment / fragment extraction over any byte source
//!
//! # Example
//!
//! ```no_run
//! use channelcast_media::FragmentDemuxer;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("show.mp4")?);
//! let mut demuxer = FragmentDemuxer::new(file);
//! let init = demuxer.read_init_segment()?;
//! while let Some(fragment) = demuxer.next_fragment()? {
//!     println!("{} byte fragment after {} byte init", fragment.len(), init.len());
//! }
//! # Ok::<(), channelcast_media::Error>(())
//! ```

pub mod error;
pub mod fmp4;
pub mod mp4;

pub use error::{Error, Result};
pub use fmp4::{extract_init_segment, is_fragmented, Fragment, FragmentDemuxer, InitSegment};
pub use mp4::{AtomType, BoxHeader};
