//! Player handle contract and simulated implementation
//!
//! The decode/render engine is an external collaborator. The scheduler only
//! sees it through the [`PlayerHandle`] trait plus an asynchronous notice
//! channel; all transition logic stays in the scheduler.
//!
//! [`SimulatedPlayer`] is a clocked fake driven by the tokio clock. The demo
//! binary uses it in place of a real decoder, and the timing tests use it
//! with the paused test clock for deterministic scenarios.

use crate::error::{Error, Result};
use crate::playback::slot::SlotId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Asynchronous report from a player handle
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The prepared media is ready for playback
    Ready,
    /// Decode or playback failed
    PlaybackError(String),
}

/// One report, tagged with the slot it belongs to and the prepare token it
/// answers
///
/// The token lets the scheduler discard stale reports: a slot is reassigned
/// to new clips for the whole session, and a late notice from a previous
/// assignment must never be mistaken for the current one.
#[derive(Debug, Clone)]
pub struct PlayerNotice {
    pub slot: SlotId,
    pub token: Uuid,
    pub event: PlayerEvent,
}

/// Create the notice channel shared by both player handles
pub fn notice_channel() -> (
    mpsc::UnboundedSender<PlayerNotice>,
    mpsc::UnboundedReceiver<PlayerNotice>,
) {
    mpsc::unbounded_channel()
}

/// Opaque decode/render unit
///
/// Two instances exist for the lifetime of a playback session, each owned
/// exclusively by one playback slot. Readiness and errors are reported
/// asynchronously on the notice channel, never through return values of
/// these methods.
pub trait PlayerHandle: Send {
    /// Begin loading media; a `Ready` or `PlaybackError` notice carrying
    /// `token` follows asynchronously
    fn prepare(&mut self, url: &str, token: Uuid) -> Result<()>;

    /// Start or resume playback
    fn play(&mut self) -> Result<()>;

    /// Hold the current frame
    fn pause(&mut self) -> Result<()>;

    /// Release decode resources for the current media; the handle itself
    /// stays alive for reuse
    fn stop(&mut self) -> Result<()>;

    /// Release the handle entirely (session teardown)
    fn release(&mut self);

    /// Current playback position in milliseconds
    fn position_ms(&self) -> u64;

    /// Media duration in milliseconds, if known yet
    fn duration_ms(&self) -> Option<u64>;

    /// Set volume (0.0 to 1.0)
    fn set_volume(&mut self, volume: f32);
}

/// Media catalogue for [`SimulatedPlayer`]
///
/// Maps URLs to the duration the simulated decoder will report. URLs not in
/// the table get the fallback duration.
#[derive(Debug, Clone)]
pub struct SimMedia {
    durations: HashMap<String, u64>,
    fallback_ms: u64,
}

impl SimMedia {
    pub fn new(fallback_ms: u64) -> Self {
        Self {
            durations: HashMap::new(),
            fallback_ms,
        }
    }

    pub fn insert(&mut self, url: impl Into<String>, duration_ms: u64) {
        self.durations.insert(url.into(), duration_ms);
    }

    pub fn duration_of(&self, url: &str) -> u64 {
        self.durations.get(url).copied().unwrap_or(self.fallback_ms)
    }
}

#[derive(Debug)]
enum SimState {
    Idle,
    Preparing,
    Playing { started_at: Instant, base_ms: u64 },
    Paused { position_ms: u64 },
    Stopped,
    Released,
}

/// Player handle fake driven by the tokio clock
///
/// `prepare` spawns a task that reports readiness after the configured
/// latency; position advances with (possibly paused) tokio time while
/// playing and freezes while paused.
pub struct SimulatedPlayer {
    slot: SlotId,
    notices: mpsc::UnboundedSender<PlayerNotice>,
    media: Arc<SimMedia>,
    prepare_latency: Duration,
    fail_prepares_remaining: u32,
    fail_playback_at_ms: Option<u64>,
    active_token: Option<Uuid>,
    state: SimState,
    duration_ms: Option<u64>,
    volume: f32,
}

impl SimulatedPlayer {
    pub fn new(
        slot: SlotId,
        notices: mpsc::UnboundedSender<PlayerNotice>,
        media: Arc<SimMedia>,
    ) -> Self {
        Self {
            slot,
            notices,
            media,
            prepare_latency: Duration::ZERO,
            fail_prepares_remaining: 0,
            fail_playback_at_ms: None,
            active_token: None,
            state: SimState::Idle,
            duration_ms: None,
            volume: 1.0,
        }
    }

    /// Delay between `prepare` and the `Ready` notice
    pub fn with_prepare_latency(mut self, latency: Duration) -> Self {
        self.prepare_latency = latency;
        self
    }

    /// Script the next `count` prepares to fail with a `PlaybackError` notice
    pub fn with_failing_prepares(mut self, count: u32) -> Self {
        self.fail_prepares_remaining = count;
        self
    }

    /// Script one `PlaybackError` notice once playback reaches `position_ms`
    pub fn with_playback_failure_at(mut self, position_ms: u64) -> Self {
        self.fail_playback_at_ms = Some(position_ms);
        self
    }

    fn released(&self) -> bool {
        matches!(self.state, SimState::Released)
    }
}

impl PlayerHandle for SimulatedPlayer {
    fn prepare(&mut self, url: &str, token: Uuid) -> Result<()> {
        if self.released() {
            return Err(Error::Player("prepare on released handle".into()));
        }

        let fail = if self.fail_prepares_remaining > 0 {
            self.fail_prepares_remaining -= 1;
            true
        } else {
            false
        };

        self.duration_ms = Some(self.media.duration_of(url));
        self.active_token = Some(token);
        self.state = SimState::Preparing;
        debug!(slot = ?self.slot, url, fail, "simulated prepare");

        let notices = self.notices.clone();
        let slot = self.slot;
        let latency = self.prepare_latency;
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let event = if fail {
                PlayerEvent::PlaybackError("simulated prepare failure".into())
            } else {
                PlayerEvent::Ready
            };
            let _ = notices.send(PlayerNotice { slot, token, event });
        });

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let base_ms = match self.state {
            SimState::Released => return Err(Error::Player("play on released handle".into())),
            SimState::Paused { position_ms } => position_ms,
            _ => 0,
        };
        self.state = SimState::Playing {
            started_at: Instant::now(),
            base_ms,
        };

        // Deliver any scripted mid-playback failure once its position is hit
        if let (Some(at_ms), Some(token)) = (self.fail_playback_at_ms.take(), self.active_token) {
            let notices = self.notices.clone();
            let slot = self.slot;
            let delay = Duration::from_millis(at_ms.saturating_sub(base_ms));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = notices.send(PlayerNotice {
                    slot,
                    token,
                    event: PlayerEvent::PlaybackError("simulated playback failure".into()),
                });
            });
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        match self.state {
            SimState::Released => Err(Error::Player("pause on released handle".into())),
            SimState::Playing { .. } => {
                let position_ms = self.position_ms();
                self.state = SimState::Paused { position_ms };
                Ok(())
            }
            // Holding a non-playing player is a no-op
            _ => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.released() {
            return Err(Error::Player("stop on released handle".into()));
        }
        self.state = SimState::Stopped;
        self.duration_ms = None;
        Ok(())
    }

    fn release(&mut self) {
        self.state = SimState::Released;
        self.duration_ms = None;
    }

    fn position_ms(&self) -> u64 {
        match self.state {
            SimState::Playing { started_at, base_ms } => {
                let elapsed = started_at.elapsed().as_millis() as u64 + base_ms;
                match self.duration_ms {
                    Some(duration) => elapsed.min(duration),
                    None => elapsed,
                }
            }
            SimState::Paused { position_ms } => position_ms,
            _ => 0,
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(media: SimMedia) -> (SimulatedPlayer, mpsc::UnboundedReceiver<PlayerNotice>) {
        let (tx, rx) = notice_channel();
        (SimulatedPlayer::new(SlotId::A, tx, Arc::new(media)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_reports_ready_after_latency() {
        let mut media = SimMedia::new(10_000);
        media.insert("https://example.com/a.mov", 30_000);
        let (player, mut rx) = player(media);
        let mut player = player.with_prepare_latency(Duration::from_millis(50));

        let token = Uuid::new_v4();
        player.prepare("https://example.com/a.mov", token).unwrap();
        assert_eq!(player.duration_ms(), Some(30_000));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.token, token);
        assert!(matches!(notice.event, PlayerEvent::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_advances_with_clock_and_freezes_on_pause() {
        let (mut player, _rx) = player(SimMedia::new(30_000));
        let token = Uuid::new_v4();
        player.prepare("https://example.com/x.mov", token).unwrap();
        player.play().unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(player.position_ms(), 1500);

        player.pause().unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(player.position_ms(), 1500);

        player.play().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(player.position_ms(), 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_caps_at_media_duration() {
        let (mut player, _rx) = player(SimMedia::new(1000));
        player.prepare("https://example.com/x.mov", Uuid::new_v4()).unwrap();
        player.play().unwrap();

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(player.position_ms(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_prepare_failure() {
        let (tx, mut rx) = notice_channel();
        let mut player = SimulatedPlayer::new(SlotId::B, tx, Arc::new(SimMedia::new(1000)))
            .with_failing_prepares(1);

        player.prepare("https://example.com/x.mov", Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::ZERO).await;
        let notice = rx.recv().await.unwrap();
        assert!(matches!(notice.event, PlayerEvent::PlaybackError(_)));

        // Second prepare succeeds
        player.prepare("https://example.com/x.mov", Uuid::new_v4()).unwrap();
        tokio::time::sleep(Duration::ZERO).await;
        let notice = rx.recv().await.unwrap();
        assert!(matches!(notice.event, PlayerEvent::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_playback_failure_at_position() {
        let (player, mut rx) = player(SimMedia::new(30_000));
        let mut player = player.with_playback_failure_at(1000);

        let token = Uuid::new_v4();
        player.prepare("https://example.com/x.mov", token).unwrap();
        tokio::time::sleep(Duration::ZERO).await;
        let notice = rx.recv().await.unwrap();
        assert!(matches!(notice.event, PlayerEvent::Ready));

        player.play().unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.token, token);
        assert!(matches!(notice.event, PlayerEvent::PlaybackError(_)));
    }

    #[tokio::test]
    async fn test_released_handle_rejects_operations() {
        let (mut player, _rx) = player(SimMedia::new(1000));
        player.release();
        assert!(player.prepare("https://example.com/x.mov", Uuid::new_v4()).is_err());
        assert!(player.play().is_err());
        assert!(player.stop().is_err());
    }
}
