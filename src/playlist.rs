//! Clip and playlist types
//!
//! The playlist is an ordered, non-empty, cyclic sequence of clips. It is
//! read-only to the scheduler; index arithmetic is modulo length so the
//! session loops forever.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One playable media item
///
/// `declared_duration_ms`, when present, is a hard cap on how long the clip
/// is shown even if the underlying media is longer. Used to bound
/// otherwise-unbounded or corrupt media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub declared_duration_ms: Option<u64>,
}

impl Clip {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            declared_duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.declared_duration_ms = Some(duration_ms);
        self
    }

    /// Validate the clip's URL
    ///
    /// Accepts http, https and file URLs. The engine never fetches media
    /// itself, but rejecting junk here keeps bad entries out of the loop.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::Playlist(format!(
                "clip '{}' has an empty URL",
                self.title
            )));
        }
        let supported = ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !supported {
            return Err(Error::Playlist(format!(
                "clip '{}' has unsupported URL scheme: {}",
                self.title, self.url
            )));
        }
        Ok(())
    }
}

/// Ordered, non-empty, cyclic sequence of clips
#[derive(Debug, Clone)]
pub struct Playlist {
    clips: Vec<Clip>,
}

impl Playlist {
    /// Create a playlist, rejecting empty or invalid clip lists
    pub fn new(clips: Vec<Clip>) -> Result<Self> {
        if clips.is_empty() {
            return Err(Error::EmptyPlaylist);
        }
        for clip in &clips {
            clip.validate()?;
        }
        Ok(Self { clips })
    }

    /// Load a playlist from a JSON file (array of clips)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let clips: Vec<Clip> =
            serde_json::from_str(&text).map_err(|e| Error::Playlist(e.to_string()))?;
        Self::new(clips)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        false // non-empty by construction
    }

    /// Clip at a cyclic index
    pub fn clip(&self, index: usize) -> &Clip {
        &self.clips[index % self.clips.len()]
    }

    /// Index of the clip following `index`, modulo length
    pub fn next(&self, index: usize) -> usize {
        (index + 1) % self.clips.len()
    }
}
