//! Dual-slot crossfade scheduler
//!
//! The state machine that owns both playback slots, decides when the active
//! clip is about to end, drives the visual transition, and pipelines
//! preparation of upcoming clips so load latency never causes a visible
//! stall.
//!
//! One authoritative state struct, mutated only inside the scheduler's own
//! select loop. Player handles deliver their reports as messages into that
//! loop rather than touching slot fields, which rules out data races without
//! any locking. The poll tick, the preload deadlines and the player notice
//! channel are the loop's only suspension points, and all of them are
//! cancelled before the handles are released at teardown.
//!
//! Per clip-boundary cycle:
//! 1. Priming (session start): prepare the first clip on slot A and play it
//!    on readiness; after a short delay begin preparing the second clip on
//!    slot B, muted and unactivated.
//! 2. Steady: poll the active slot's position. The clip's declared duration
//!    is a hard cap on the media duration.
//! 3. Trigger: when remaining time drops under the threshold, hold the
//!    outgoing slot's last frame, start the incoming slot, and (in
//!    crossfade mode) ramp the incoming slot's opacity above it.
//! 4. Completion: snap the outgoing slot invisible, stop it, and only then
//!    flip the active slot and clip index.
//! 5. Re-preload: schedule preparation of the clip after the new one into
//!    the freed slot, after a longer delay than priming used.

use crate::config::{EngineConfig, TransitionMode};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::playback::compositor::{fade_progress, RenderPlan};
use crate::playback::preloader::{PendingLoad, Preloader};
use crate::playback::slot::{PlaybackSlot, SlotId, SlotStatus};
use crate::player::{PlayerEvent, PlayerHandle, PlayerNotice};
use crate::playlist::Playlist;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

/// External commands accepted by the running scheduler
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// Tear the session down: cancel timers, release both handles, exit
    Shutdown,
}

/// Cloneable control handle for a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<EngineEvent>,
    render_rx: watch::Receiver<RenderPlan>,
}

impl SchedulerHandle {
    /// Request session teardown
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }

    /// Subscribe to the diagnostic event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Receiver for the latest compositor render plan
    pub fn render_plan(&self) -> watch::Receiver<RenderPlan> {
        self.render_rx.clone()
    }
}

/// In-flight transition bookkeeping
struct Transition {
    from: SlotId,
    to: SlotId,
    started_at: Instant,
    fade: Duration,
    /// Incoming slot was not ready at trigger time; fade is skipped and the
    /// flip waits for its readiness report
    awaiting_ready: bool,
}

/// Scheduler phase
///
/// At most one transition is ever in flight; the trigger only fires from
/// `Steady`, so a second trigger while one is running is a no-op.
enum Phase {
    /// Session start: first clip preparing, nothing rendered yet
    Priming,
    /// Active clip playing, position polled for the boundary trigger
    Steady,
    /// Swap in progress
    Transitioning(Transition),
}

enum Wake {
    Tick,
    Notice(PlayerNotice),
    Preload(PendingLoad),
    Shutdown,
}

/// The dual-slot playback scheduler
pub struct CrossfadeScheduler {
    config: EngineConfig,
    playlist: Playlist,
    slots: [PlaybackSlot; 2],
    /// The slot the viewer perceives as currently playing
    active: SlotId,
    /// Always equals the active slot's clip index
    current_clip: usize,
    phase: Phase,
    preloader: Preloader,
    notice_rx: mpsc::UnboundedReceiver<PlayerNotice>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: broadcast::Sender<EngineEvent>,
    render_tx: watch::Sender<RenderPlan>,
}

impl CrossfadeScheduler {
    /// Create a scheduler over a non-empty playlist and two player handles
    ///
    /// `notice_rx` is the receiving end of the channel both handles report
    /// readiness and errors on.
    pub fn new(
        config: EngineConfig,
        playlist: Playlist,
        handle_a: Box<dyn PlayerHandle>,
        handle_b: Box<dyn PlayerHandle>,
        notice_rx: mpsc::UnboundedReceiver<PlayerNotice>,
    ) -> Result<(Self, SchedulerHandle)> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        let (render_tx, render_rx) = watch::channel(RenderPlan::hidden());

        let scheduler = Self {
            config,
            playlist,
            slots: [
                PlaybackSlot::new(SlotId::A, handle_a),
                PlaybackSlot::new(SlotId::B, handle_b),
            ],
            active: SlotId::A,
            current_clip: 0,
            phase: Phase::Priming,
            preloader: Preloader::new(),
            notice_rx,
            cmd_rx,
            event_tx: event_tx.clone(),
            render_tx,
        };

        let handle = SchedulerHandle {
            cmd_tx,
            event_tx,
            render_rx,
        };

        Ok((scheduler, handle))
    }

    /// Run the session until shutdown
    ///
    /// The loop never exits on clip failures; only an external shutdown (or
    /// loss of both control channels) ends it.
    pub async fn run(mut self) -> Result<()> {
        self.start_session();
        let mut poll = interval(self.config.poll_interval());

        loop {
            let wake = tokio::select! {
                _ = poll.tick() => Wake::Tick,
                notice = self.notice_rx.recv() => {
                    notice.map(Wake::Notice).unwrap_or(Wake::Shutdown)
                }
                command = self.cmd_rx.recv() => match command {
                    Some(Command::Shutdown) | None => Wake::Shutdown,
                },
                load = self.preloader.due() => Wake::Preload(load),
            };

            match wake {
                Wake::Tick => self.on_tick(),
                Wake::Notice(notice) => self.on_notice(notice),
                Wake::Preload(load) => self.on_preload_due(load),
                Wake::Shutdown => {
                    self.teardown();
                    return Ok(());
                }
            }
        }
    }

    // ========================================
    // Session lifecycle
    // ========================================

    fn start_session(&mut self) {
        info!(
            mode = %self.config.mode,
            clips = self.playlist.len(),
            "starting playback session"
        );
        self.emit(EngineEvent::SessionStarted {
            mode: self.config.mode,
            clip_count: self.playlist.len(),
            timestamp: Utc::now(),
        });

        // Prime the active slot with the first clip right away; the standby
        // slot follows after a delay so the first decoder settles alone.
        self.start_prepare(self.active, self.current_clip);

        let standby = self.active.other();
        let next = self.playlist.next(self.current_clip);
        self.preloader.schedule(
            PendingLoad {
                slot: standby,
                clip_index: next,
            },
            self.config.initial_preload_delay(),
        );
        self.emit(EngineEvent::PreloadScheduled {
            slot: standby,
            clip_index: next,
            delay_ms: self.config.initial_preload_delay_ms,
            timestamp: Utc::now(),
        });
    }

    fn teardown(&mut self) {
        info!("session teardown");
        // Pending timers first, so nothing fires against a released handle
        self.preloader.cancel_all();
        for id in [SlotId::A, SlotId::B] {
            if let Err(e) = self.slots[id.index()].stop() {
                warn!(slot = ?id, error = %e, "stop during teardown failed");
            }
            self.slots[id.index()].release();
        }
        let _ = self.render_tx.send(RenderPlan::hidden());
        self.emit(EngineEvent::SessionEnded {
            timestamp: Utc::now(),
        });
    }

    // ========================================
    // Poll tick
    // ========================================

    fn on_tick(&mut self) {
        let now = Instant::now();
        for id in [SlotId::A, SlotId::B] {
            if self.slots[id.index()].prepare_overdue(now) {
                self.prepare_failure(id, "readiness timeout".to_string());
            }
        }

        match self.phase {
            Phase::Priming => {}
            Phase::Steady => self.maybe_trigger(),
            Phase::Transitioning(_) => self.advance_fade(),
        }
    }

    /// Check whether the active clip is close enough to its end to begin
    /// the next transition
    fn maybe_trigger(&mut self) {
        if !matches!(self.phase, Phase::Steady) {
            return;
        }

        let slot = &self.slots[self.active.index()];
        let declared = self.playlist.clip(self.current_clip).declared_duration_ms;

        // The declared duration is a hard cap: even a longer media file is
        // cut at the effective end.
        let effective_end = match (slot.duration_ms(), declared) {
            (Some(media), Some(cap)) => Some(media.min(cap)),
            (Some(media), None) => Some(media),
            (None, Some(cap)) => Some(cap),
            (None, None) => None,
        };
        let Some(end) = effective_end else {
            // Duration not known yet; check again next tick
            return;
        };

        let remaining = end.saturating_sub(slot.position_ms());
        if remaining <= self.config.trigger_threshold_ms {
            debug!(remaining, clip = self.current_clip, "clip boundary trigger");
            self.begin_transition();
        }
    }

    // ========================================
    // Transitions
    // ========================================

    fn begin_transition(&mut self) {
        if !matches!(self.phase, Phase::Steady) {
            debug!("transition already in flight; trigger ignored");
            return;
        }

        let from = self.active;
        let to = from.other();
        let from_clip = self.current_clip;

        // Hold the outgoing clip's last frame: the fallback visual in cut
        // mode, the fading-out background in crossfade mode.
        if let Err(e) = self.slots[from.index()].freeze() {
            warn!(slot = ?from, error = %e, "failed to hold outgoing slot");
        }

        if self.slots[to.index()].status != SlotStatus::Ready {
            self.enter_awaiting_ready(from, to, from_clip, "incoming slot not ready at trigger");
            return;
        }

        if let Err(e) = self.slots[to.index()].activate() {
            warn!(slot = ?to, error = %e, "incoming slot failed to start");
            // Recover like a prepare failure, then wait for whatever the
            // slot loads next through the cut fallback path.
            self.prepare_failure(to, e.to_string());
            self.enter_awaiting_ready(from, to, from_clip, "incoming slot failed to start");
            return;
        }

        let fade = self.config.fade_duration();
        let to_clip = self.slots[to.index()].clip_index;
        self.slots[to.index()].opacity = if fade.is_zero() { 1.0 } else { 0.0 };

        self.emit(EngineEvent::TransitionStarted {
            from,
            to,
            from_clip,
            to_clip,
            fade_ms: fade.as_millis() as u64,
            timestamp: Utc::now(),
        });

        self.phase = Phase::Transitioning(Transition {
            from,
            to,
            started_at: Instant::now(),
            fade,
            awaiting_ready: false,
        });

        if fade.is_zero() {
            self.complete_transition();
        } else {
            self.publish_render();
        }
    }

    /// Fall back to cut behavior for this one transition: the outgoing
    /// slot's frozen frame stays up until the incoming slot reports ready,
    /// then the swap happens immediately with no fade.
    fn enter_awaiting_ready(&mut self, from: SlotId, to: SlotId, from_clip: usize, reason: &str) {
        // If nothing is loading into the incoming slot (its preload delay
        // has not elapsed yet, or a skip emptied it), start one now.
        let status = self.slots[to.index()].status;
        if status != SlotStatus::Preparing {
            let clip_index = self
                .preloader
                .take_for_slot(to)
                .map(|p| p.clip_index)
                .unwrap_or_else(|| self.playlist.next(from_clip));
            self.start_prepare(to, clip_index);
        }

        let to_clip = self.slots[to.index()].clip_index;
        warn!(slot = ?to, clip = to_clip, reason, "transition fallback to cut");
        self.emit(EngineEvent::TransitionStarted {
            from,
            to,
            from_clip,
            to_clip,
            fade_ms: 0,
            timestamp: Utc::now(),
        });
        self.emit(EngineEvent::TransitionFallback {
            slot: to,
            clip_index: to_clip,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        self.phase = Phase::Transitioning(Transition {
            from,
            to,
            started_at: Instant::now(),
            fade: Duration::ZERO,
            awaiting_ready: true,
        });
        self.publish_render();
    }

    /// Sample the fade on the poll tick and complete it when the ramp ends
    fn advance_fade(&mut self) {
        let (to, started_at, fade, awaiting) = match &self.phase {
            Phase::Transitioning(t) => (t.to, t.started_at, t.fade, t.awaiting_ready),
            _ => return,
        };
        if awaiting {
            // Nothing to animate; the flip happens on the readiness report
            return;
        }

        let elapsed = started_at.elapsed();
        if elapsed >= fade {
            self.complete_transition();
        } else {
            self.slots[to.index()].opacity = fade_progress(elapsed, fade);
            self.publish_render();
        }
    }

    fn complete_transition(&mut self) {
        let transition = match std::mem::replace(&mut self.phase, Phase::Steady) {
            Phase::Transitioning(t) => t,
            other => {
                self.phase = other;
                return;
            }
        };
        let Transition { from, to, .. } = transition;

        // Snap the outgoing slot invisible strictly before the flip; doing
        // it the other way round shows one frame with both slots wrong.
        self.slots[to.index()].opacity = 1.0;
        self.slots[from.index()].opacity = 0.0;
        if self.config.mode == TransitionMode::Crossfade {
            let _ = self.render_tx.send(RenderPlan::transition(from, to, 0.0, 1.0));
        }

        if let Err(e) = self.slots[from.index()].stop() {
            warn!(slot = ?from, error = %e, "failed to stop outgoing slot");
        }

        self.active = to;
        self.current_clip = self.slots[to.index()].clip_index;
        self.publish_render();

        let title = self.playlist.clip(self.current_clip).title.clone();
        info!(clip = self.current_clip, %title, slot = ?to, "transition complete");
        self.emit(EngineEvent::TransitionCompleted {
            active: to,
            clip_index: self.current_clip,
            timestamp: Utc::now(),
        });
        self.emit(EngineEvent::ClipStarted {
            slot: to,
            clip_index: self.current_clip,
            title,
            timestamp: Utc::now(),
        });

        // Pipeline the clip two positions past the one that just ended into
        // the freed slot, throttled so decoder startup does not contend
        // with the live clip.
        let target = self.playlist.next(self.current_clip);
        self.preloader.schedule(
            PendingLoad {
                slot: from,
                clip_index: target,
            },
            self.config.repreload_delay(),
        );
        self.emit(EngineEvent::PreloadScheduled {
            slot: from,
            clip_index: target,
            delay_ms: self.config.repreload_delay_ms,
            timestamp: Utc::now(),
        });

        // A declared duration under the trigger threshold must transition
        // immediately on activation, not wait out a poll tick.
        self.maybe_trigger();
    }

    // ========================================
    // Player notices
    // ========================================

    fn on_notice(&mut self, notice: PlayerNotice) {
        let slot_id = notice.slot;
        if self.slots[slot_id.index()].prepare_token != Some(notice.token) {
            debug!(slot = ?slot_id, "stale player notice ignored");
            return;
        }

        match notice.event {
            PlayerEvent::Ready => self.on_ready(slot_id),
            PlayerEvent::PlaybackError(message) => self.on_playback_error(slot_id, message),
        }
    }

    fn on_ready(&mut self, slot_id: SlotId) {
        if self.slots[slot_id.index()].status != SlotStatus::Preparing {
            debug!(slot = ?slot_id, "readiness report for non-preparing slot ignored");
            return;
        }
        self.slots[slot_id.index()].mark_ready();
        debug!(slot = ?slot_id, clip = self.slots[slot_id.index()].clip_index, "slot ready");

        match &self.phase {
            Phase::Priming if slot_id == self.active => self.activate_first(),
            Phase::Transitioning(t) if t.awaiting_ready && slot_id == t.to => {
                // Show the incoming slot the moment it is ready, even if a
                // brief frozen frame resulted while waiting.
                if let Err(e) = self.slots[slot_id.index()].activate() {
                    let message = e.to_string();
                    warn!(slot = ?slot_id, error = %message, "late activation failed");
                    self.prepare_failure(slot_id, message);
                    return;
                }
                self.slots[slot_id.index()].opacity = 1.0;
                self.complete_transition();
            }
            _ => {}
        }
    }

    /// First activation of the session: Priming -> Steady
    fn activate_first(&mut self) {
        if let Err(e) = self.slots[self.active.index()].activate() {
            let message = e.to_string();
            warn!(error = %message, "first clip failed to start");
            self.prepare_failure(self.active, message);
            return;
        }
        self.slots[self.active.index()].opacity = 1.0;
        self.phase = Phase::Steady;
        self.publish_render();

        let title = self.playlist.clip(self.current_clip).title.clone();
        info!(clip = self.current_clip, %title, "playback session live");
        self.emit(EngineEvent::ClipStarted {
            slot: self.active,
            clip_index: self.current_clip,
            title,
            timestamp: Utc::now(),
        });

        self.maybe_trigger();
    }

    fn on_playback_error(&mut self, slot_id: SlotId, message: String) {
        let clip_index = self.slots[slot_id.index()].clip_index;
        error!(slot = ?slot_id, clip = clip_index, %message, "player reported error");
        self.emit(EngineEvent::PlaybackErrored {
            slot: slot_id,
            clip_index,
            message: message.clone(),
            timestamp: Utc::now(),
        });

        // A slot that never reached readiness is a prepare failure
        if self.slots[slot_id.index()].status == SlotStatus::Preparing {
            self.prepare_failure(slot_id, message);
            return;
        }

        match &self.phase {
            Phase::Steady if slot_id == self.active => {
                // Clip ended early; advance through the normal boundary path
                self.begin_transition();
            }
            Phase::Transitioning(t) if slot_id == t.to && !t.awaiting_ready => {
                // Incoming died mid-fade: finish the flip, then move on to
                // the next clip the moment it becomes ready.
                if let Err(e) = self.slots[slot_id.index()].stop() {
                    warn!(slot = ?slot_id, error = %e, "failed to stop errored slot");
                }
                self.complete_transition();
                self.begin_transition();
            }
            Phase::Transitioning(t) if slot_id == t.from => {
                // Outgoing is on its way out anyway; drop it now
                if let Err(e) = self.slots[slot_id.index()].stop() {
                    warn!(slot = ?slot_id, error = %e, "failed to stop errored slot");
                }
            }
            _ => {}
        }
    }

    // ========================================
    // Preparation
    // ========================================

    fn on_preload_due(&mut self, load: PendingLoad) {
        if load.slot == self.active && !matches!(self.phase, Phase::Priming) {
            warn!(slot = ?load.slot, "preload due for active slot ignored");
            return;
        }
        self.start_prepare(load.slot, load.clip_index);
    }

    fn start_prepare(&mut self, slot_id: SlotId, clip_index: usize) {
        let url = self.playlist.clip(clip_index).url.clone();
        let deadline = Instant::now() + self.config.readiness_timeout();
        debug!(slot = ?slot_id, clip = clip_index, "starting prepare");
        if let Err(e) = self.slots[slot_id.index()].begin_prepare(clip_index, &url, deadline) {
            self.prepare_failure(slot_id, e.to_string());
        }
    }

    /// A slot failed to reach readiness: retry the same clip once after a
    /// short backoff, then skip the clip entirely so one bad entry never
    /// stalls the loop.
    fn prepare_failure(&mut self, slot_id: SlotId, reason: String) {
        let clip_index = self.slots[slot_id.index()].clip_index;
        if let Err(e) = self.slots[slot_id.index()].stop() {
            warn!(slot = ?slot_id, error = %e, "failed to stop slot after prepare failure");
        }

        if !self.slots[slot_id.index()].retried {
            self.slots[slot_id.index()].retried = true;
            warn!(slot = ?slot_id, clip = clip_index, %reason, "prepare failed; retrying once");
            self.emit(EngineEvent::PrepareFailed {
                slot: slot_id,
                clip_index,
                will_retry: true,
                reason,
                timestamp: Utc::now(),
            });
            self.preloader.schedule(
                PendingLoad {
                    slot: slot_id,
                    clip_index,
                },
                self.config.retry_backoff(),
            );
            return;
        }

        self.slots[slot_id.index()].retried = false;
        error!(slot = ?slot_id, clip = clip_index, %reason, "prepare failed twice; skipping clip");
        self.emit(EngineEvent::PrepareFailed {
            slot: slot_id,
            clip_index,
            will_retry: false,
            reason,
            timestamp: Utc::now(),
        });
        self.emit(EngineEvent::ClipSkipped {
            clip_index,
            timestamp: Utc::now(),
        });

        // Advance past the bad clip as if its duration were zero
        let next = self.playlist.next(clip_index);
        if matches!(self.phase, Phase::Priming) && slot_id == self.active {
            self.current_clip = next;
            // The standby slot was booked for the clip we just advanced
            // onto; push its assignment one further so both slots never
            // hold the same index.
            let standby = slot_id.other();
            if self.preloader.pending_clip(standby) == Some(next) {
                self.preloader.retarget(standby, self.playlist.next(next));
            } else {
                let standby_slot = &self.slots[standby.index()];
                if matches!(standby_slot.status, SlotStatus::Preparing | SlotStatus::Ready)
                    && standby_slot.clip_index == next
                {
                    self.start_prepare(standby, self.playlist.next(next));
                }
            }
        }
        self.preloader.schedule(
            PendingLoad {
                slot: slot_id,
                clip_index: next,
            },
            self.config.retry_backoff(),
        );
    }

    // ========================================
    // Outputs
    // ========================================

    fn publish_render(&self) {
        let plan = match (&self.phase, self.config.mode) {
            (Phase::Priming, _) => RenderPlan::hidden(),
            (Phase::Transitioning(t), TransitionMode::Crossfade) if !t.awaiting_ready => {
                RenderPlan::transition(
                    t.from,
                    t.to,
                    self.slots[t.from.index()].opacity,
                    self.slots[t.to.index()].opacity,
                )
            }
            _ => RenderPlan::steady(self.active),
        };
        let _ = self.render_tx.send(plan);
    }

    fn emit(&self, event: EngineEvent) {
        // No receivers is fine; diagnostics are best-effort
        let _ = self.event_tx.send(event);
    }
}
