//! # driftplay
//!
//! Ambient, infinitely-looping video presentation engine for fixed-size
//! displays.
//!
//! **Purpose:** Play a cyclic list of video clips back-to-back, swapping
//! between consecutive clips by an instantaneous cut or a timed crossfade,
//! while prefetching upcoming clips so playback never visibly stalls.
//!
//! **Architecture:** A single-owner state machine (the crossfade scheduler)
//! owns two interchangeable player handles wrapped in playback slots. All
//! timing, ordering and failure recovery lives in the scheduler's select
//! loop; the decode/render engine and the on-screen compositor are external
//! collaborators reached through the [`player::PlayerHandle`] trait and the
//! [`playback::RenderPlan`] watch channel.

pub mod config;
pub mod error;
pub mod events;
pub mod playback;
pub mod player;
pub mod playlist;

pub use config::{EngineConfig, TransitionMode};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use playback::{CrossfadeScheduler, RenderPlan, SchedulerHandle, SlotId};
pub use player::{notice_channel, PlayerHandle};
pub use playlist::{Clip, Playlist};
