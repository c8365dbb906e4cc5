//! Deferred clip preparation
//!
//! Preparing a clip is deliberately delayed so decoder initialization never
//! competes with playback of the current clip. The preloader holds at most
//! one pending load per slot as an explicit deadline that the scheduler's
//! select loop awaits.
//!
//! Scheduling a new load for a slot replaces that slot's pending one
//! wholesale, and teardown cancels everything outright, so a stale timer
//! can never fire against a slot that has moved on.

use super::slot::SlotId;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A prepare that is due to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLoad {
    pub slot: SlotId,
    pub clip_index: usize,
}

struct Deferred {
    load: PendingLoad,
    due_at: Instant,
}

/// Cancellable preload timers, one per slot
#[derive(Default)]
pub struct Preloader {
    pending: [Option<Deferred>; 2],
}

impl Preloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a load after `delay`, replacing the slot's pending one
    pub fn schedule(&mut self, load: PendingLoad, delay: Duration) {
        let entry = &mut self.pending[load.slot.index()];
        if let Some(previous) = entry {
            debug!(replaced = ?previous.load, "replacing pending preload");
        }
        *entry = Some(Deferred {
            load,
            due_at: Instant::now() + delay,
        });
    }

    /// Drop all pending loads without side effects on the slots
    pub fn cancel_all(&mut self) {
        self.pending = [None, None];
    }

    /// Cancel and return the pending load targeting `slot`, if any
    pub fn take_for_slot(&mut self, slot: SlotId) -> Option<PendingLoad> {
        self.pending[slot.index()].take().map(|d| d.load)
    }

    /// Clip index of the slot's pending load, if any
    pub fn pending_clip(&self, slot: SlotId) -> Option<usize> {
        self.pending[slot.index()].as_ref().map(|d| d.load.clip_index)
    }

    /// Repoint the slot's pending load at a different clip, keeping its
    /// deadline
    pub fn retarget(&mut self, slot: SlotId, clip_index: usize) {
        if let Some(deferred) = &mut self.pending[slot.index()] {
            debug!(?slot, from = deferred.load.clip_index, to = clip_index, "retargeting preload");
            deferred.load.clip_index = clip_index;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.iter().all(|p| p.is_none())
    }

    /// Wait until the earliest pending load is due and take it
    ///
    /// Pends forever when nothing is scheduled. Cancel-safe: a load is only
    /// consumed after its deadline has passed.
    pub async fn due(&mut self) -> PendingLoad {
        let earliest = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|d| (index, d.due_at)))
            .min_by_key(|(_, due_at)| *due_at);

        let (index, deadline) = match earliest {
            Some(found) => found,
            None => return std::future::pending().await,
        };
        tokio::time::sleep_until(deadline).await;
        match self.pending[index].take() {
            Some(deferred) => deferred.load,
            None => std::future::pending().await,
        }
    }
}
