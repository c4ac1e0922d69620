//! Channelcast-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across channelcast:
//!
//! - **Typed IDs**: [`ChannelId`] (small positive channel number) and
//!   [`AssetId`] (video asset identity)
//! - **Core Types**: [`VideoAsset`] and [`Channel`]
//! - **Path Utilities**: resolving storage keys under a root directory
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use channelcast_common::{AssetId, ChannelId, VideoAsset};
//!
//! let channel = ChannelId::new(3).unwrap();
//! assert_eq!(channel.get(), 3);
//!
//! let asset = VideoAsset::new("vid001", "Global Headlines", 180.0, "news/headlines.mp4").unwrap();
//! assert_eq!(asset.id, AssetId::from("vid001"));
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
