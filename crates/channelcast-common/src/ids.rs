//! Typed ID wrappers for type safety across channelcast.
//!
//! Channel numbers and asset identities are both user-visible and easy to
//! confuse with plain integers and strings, so each gets a newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel number. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChannelId(u32);

impl ChannelId {
    /// Create a channel ID, rejecting zero.
    #[must_use]
    pub fn new(number: u32) -> Option<Self> {
        (number > 0).then_some(Self(number))
    }

    /// The channel number.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for ChannelId {
    type Error = crate::Error;

    fn try_from(number: u32) -> crate::Result<Self> {
        Self::new(number)
            .ok_or_else(|| crate::Error::invalid_input("channel number must be positive"))
    }
}

impl From<ChannelId> for u32 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl FromStr for ChannelId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let number: u32 = s
            .parse()
            .map_err(|_| crate::Error::invalid_input(format!("invalid channel number: {s}")))?;
        Self::try_from(number)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a video asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
