//! Diagnostic event types
//!
//! The scheduler emits these on a broadcast channel for an external
//! observability collaborator. They describe clip boundaries, transitions
//! and recovered failures; the engine itself never blocks on them.

use crate::config::TransitionMode;
use crate::playback::slot::SlotId;
use serde::{Deserialize, Serialize};

/// Diagnostic events emitted by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Playback session started (priming begins)
    SessionStarted {
        mode: TransitionMode,
        clip_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip became the active (viewer-perceived) clip
    ClipStarted {
        slot: SlotId,
        clip_index: usize,
        title: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Clip boundary reached; transition to the next clip began
    TransitionStarted {
        from: SlotId,
        to: SlotId,
        from_clip: usize,
        to_clip: usize,
        fade_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transition finished; the active slot flipped
    TransitionCompleted {
        active: SlotId,
        clip_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Incoming slot was not ready at trigger time; fade skipped for this
    /// transition and the incoming clip shown as soon as it becomes ready
    TransitionFallback {
        slot: SlotId,
        clip_index: usize,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Deferred preparation of a future clip was scheduled
    PreloadScheduled {
        slot: SlotId,
        clip_index: usize,
        delay_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A slot failed to reach readiness for its assigned clip
    PrepareFailed {
        slot: SlotId,
        clip_index: usize,
        will_retry: bool,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip was dropped from the rotation after repeated prepare failures
    ClipSkipped {
        clip_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The player handle reported an error during playback
    PlaybackErrored {
        slot: SlotId,
        clip_index: usize,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session torn down; both player handles released
    SessionEnded {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
