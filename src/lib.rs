//! Channelcast - linear television over fragmented MP4
//!
//! This library crate exposes the core functionality for integration testing.

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod scheduler;
pub mod server;
pub mod stager;
