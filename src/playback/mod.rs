//! Playback orchestration
//!
//! **Module structure:**
//! - `slot.rs`: the two reusable playback units wrapping the player handles
//! - `compositor.rs`: per-slot visibility/opacity/stacking computation
//! - `preloader.rs`: cancellable deferred clip preparation
//! - `scheduler.rs`: the dual-slot crossfade state machine

pub mod compositor;
pub mod preloader;
pub mod scheduler;
pub mod slot;

pub use compositor::{RenderPlan, SlotLayer};
pub use scheduler::{CrossfadeScheduler, SchedulerHandle};
pub use slot::{SlotId, SlotStatus};
