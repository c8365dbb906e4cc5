//! Playback slots
//!
//! A slot wraps one player handle with the scheduler's view of it: which
//! clip it is assigned to, where it is in its lifecycle, and its current
//! opacity. Exactly two slots exist for the lifetime of a session; they are
//! never created or destroyed mid-session, only reassigned to new clips.
//!
//! Only the scheduler mutates a slot. Player handles report state
//! asynchronously on the notice channel, never by writing slot fields.

use crate::error::{Error, Result};
use crate::player::PlayerHandle;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identifier for one of the two playback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// The other slot
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    /// Array index for slot-indexed storage
    pub fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

/// Slot lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// No clip assigned
    Idle,
    /// Prepare issued, waiting for the handle's readiness report
    Preparing,
    /// Media loaded, playback not started
    Ready,
    /// Actively playing
    Playing,
    /// Outgoing during a transition; last frame held
    Fading,
    /// Clip resources released, handle alive for reuse
    Stopped,
}

/// One of the two reusable playback units the scheduler alternates between
pub struct PlaybackSlot {
    pub id: SlotId,
    handle: Box<dyn PlayerHandle>,
    pub clip_index: usize,
    pub status: SlotStatus,
    pub opacity: f32,
    /// Token identifying the in-flight (or most recent) prepare request
    pub prepare_token: Option<Uuid>,
    /// Deadline by which the current prepare must report ready
    pub ready_deadline: Option<Instant>,
    /// Whether the current clip's prepare has already been retried once
    pub retried: bool,
}

impl PlaybackSlot {
    pub fn new(id: SlotId, handle: Box<dyn PlayerHandle>) -> Self {
        Self {
            id,
            handle,
            clip_index: 0,
            status: SlotStatus::Idle,
            opacity: 0.0,
            prepare_token: None,
            ready_deadline: None,
            retried: false,
        }
    }

    /// Begin preparing a clip: Idle/Stopped -> Preparing
    ///
    /// The slot is muted while preloading; volume comes up on activation.
    /// Returns the token that the handle's eventual readiness report must
    /// carry.
    pub fn begin_prepare(
        &mut self,
        clip_index: usize,
        url: &str,
        deadline: Instant,
    ) -> Result<Uuid> {
        let token = Uuid::new_v4();
        self.handle.set_volume(0.0);
        self.handle.prepare(url, token)?;
        self.clip_index = clip_index;
        self.status = SlotStatus::Preparing;
        self.opacity = 0.0;
        self.prepare_token = Some(token);
        self.ready_deadline = Some(deadline);
        Ok(token)
    }

    /// Record the handle's readiness report: Preparing -> Ready
    pub fn mark_ready(&mut self) {
        self.status = SlotStatus::Ready;
        self.ready_deadline = None;
        self.retried = false;
    }

    /// Start playback from position 0: Ready -> Playing
    pub fn activate(&mut self) -> Result<()> {
        if self.status != SlotStatus::Ready {
            return Err(Error::InvalidState(format!(
                "activate requires Ready, slot {:?} is {:?}",
                self.id, self.status
            )));
        }
        self.handle.set_volume(1.0);
        self.handle.play()?;
        self.status = SlotStatus::Playing;
        Ok(())
    }

    /// Hold the current frame as the outgoing visual: Playing -> Fading
    pub fn freeze(&mut self) -> Result<()> {
        self.handle.pause()?;
        if self.status == SlotStatus::Playing {
            self.status = SlotStatus::Fading;
        }
        Ok(())
    }

    /// Release the current clip's decode resources; the handle stays alive
    ///
    /// Idempotent: stopping a stopped slot is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.status == SlotStatus::Stopped {
            return Ok(());
        }
        self.handle.stop()?;
        self.status = SlotStatus::Stopped;
        self.prepare_token = None;
        self.ready_deadline = None;
        Ok(())
    }

    /// Release the underlying handle (session teardown only)
    pub fn release(&mut self) {
        self.handle.release();
        self.status = SlotStatus::Idle;
        self.prepare_token = None;
        self.ready_deadline = None;
    }

    pub fn position_ms(&self) -> u64 {
        self.handle.position_ms()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.handle.duration_ms()
    }

    /// Whether the current prepare has blown past its readiness deadline
    pub fn prepare_overdue(&self, now: Instant) -> bool {
        self.status == SlotStatus::Preparing
            && self.ready_deadline.map(|d| now >= d).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{notice_channel, SimMedia, SimulatedPlayer};
    use std::sync::Arc;
    use std::time::Duration;

    fn slot(id: SlotId) -> PlaybackSlot {
        let (tx, _rx) = notice_channel();
        let player = SimulatedPlayer::new(id, tx, Arc::new(SimMedia::new(30_000)));
        PlaybackSlot::new(id, Box::new(player))
    }

    #[test]
    fn test_slot_id_other() {
        assert_eq!(SlotId::A.other(), SlotId::B);
        assert_eq!(SlotId::B.other(), SlotId::A);
        assert_eq!(SlotId::A.index(), 0);
        assert_eq!(SlotId::B.index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_activate_lifecycle() {
        let mut slot = slot(SlotId::A);
        assert_eq!(slot.status, SlotStatus::Idle);

        let deadline = Instant::now() + Duration::from_secs(10);
        slot.begin_prepare(2, "https://example.com/a.mov", deadline).unwrap();
        assert_eq!(slot.status, SlotStatus::Preparing);
        assert_eq!(slot.clip_index, 2);
        assert!(slot.prepare_token.is_some());

        // Activation before readiness is rejected
        assert!(slot.activate().is_err());

        slot.mark_ready();
        assert_eq!(slot.status, SlotStatus::Ready);
        slot.activate().unwrap();
        assert_eq!(slot.status, SlotStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freeze_and_stop() {
        let mut slot = slot(SlotId::B);
        let deadline = Instant::now() + Duration::from_secs(10);
        slot.begin_prepare(0, "https://example.com/a.mov", deadline).unwrap();
        slot.mark_ready();
        slot.activate().unwrap();

        slot.freeze().unwrap();
        assert_eq!(slot.status, SlotStatus::Fading);

        slot.stop().unwrap();
        assert_eq!(slot.status, SlotStatus::Stopped);
        assert!(slot.prepare_token.is_none());

        // Idempotent
        slot.stop().unwrap();
        assert_eq!(slot.status, SlotStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_overdue() {
        let mut slot = slot(SlotId::A);
        let deadline = Instant::now() + Duration::from_millis(100);
        slot.begin_prepare(0, "https://example.com/a.mov", deadline).unwrap();

        assert!(!slot.prepare_overdue(Instant::now()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(slot.prepare_overdue(Instant::now()));

        slot.mark_ready();
        assert!(!slot.prepare_overdue(Instant::now()));
    }
}
