//! Monitored channel definitions.
//!
//! Channels are static configuration: a JSON or TOML file listing every
//! channel that can be watched. The file is read once at startup.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// A channel that can be watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTarget {
    /// Stable identifier used as the storage key.
    pub id: String,
    /// Public `@name` handle used to build page URLs.
    pub handle: String,
    pub display_name: String,
    /// Channel home page, used as the notification author link.
    pub url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelsFile {
    channels: Vec<ChannelTarget>,
}

/// The configured set of channels, in file order.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<ChannelTarget>,
}

impl ChannelRegistry {
    /// Build a registry, rejecting duplicate ids and empty handles.
    ///
    /// # Errors
    ///
    /// Returns an error if two channels share an id or a channel has no handle.
    pub fn new(channels: Vec<ChannelTarget>) -> Result<Self> {
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.handle.trim().is_empty() {
                bail!("channel '{}' has an empty handle", channel.id);
            }
            if !seen.insert(channel.id.as_str()) {
                bail!("duplicate channel id '{}'", channel.id);
            }
        }
        Ok(Self { channels })
    }

    /// Load channels from a `.json` or `.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read channels file: {}", path.display()))?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let file: ChannelsFile = if is_toml {
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse channels TOML: {}", path.display()))?
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse channels JSON: {}", path.display()))?
        };

        Self::new(file.channels)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChannelTarget> {
        self.channels.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn all(&self) -> &[ChannelTarget] {
        &self.channels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
