//! Test helpers for driftplay scheduler scenarios
//!
//! Provides a rig that wires the scheduler to simulated players on the
//! paused tokio clock, plus collectors for the diagnostic event stream and
//! the render plan history.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use driftplay::player::{notice_channel, SimMedia, SimulatedPlayer};
use driftplay::{
    Clip, CrossfadeScheduler, EngineEvent, EngineConfig, Playlist, RenderPlan, SchedulerHandle,
    SlotId,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Recorded diagnostic events
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    fn attach(handle: &SchedulerHandle) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut rx = handle.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });
        Self { events }
    }

    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineEvent) -> bool) -> usize {
        self.snapshot().iter().filter(|e| pred(e)).count()
    }

    pub fn any(&self, pred: impl Fn(&EngineEvent) -> bool) -> bool {
        self.count(pred) > 0
    }

    /// Clip indices in the order they became active, with their slots
    pub fn clips_started(&self) -> Vec<(SlotId, usize)> {
        self.snapshot()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ClipStarted {
                    slot, clip_index, ..
                } => Some((*slot, *clip_index)),
                _ => None,
            })
            .collect()
    }
}

/// Every render plan the scheduler ever published
#[derive(Clone)]
pub struct RenderLog {
    plans: Arc<Mutex<Vec<RenderPlan>>>,
}

impl RenderLog {
    fn attach(handle: &SchedulerHandle) -> Self {
        let plans = Arc::new(Mutex::new(Vec::new()));
        let sink = plans.clone();
        let mut rx = handle.render_plan();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let plan = *rx.borrow_and_update();
                sink.lock().unwrap().push(plan);
            }
        });
        Self { plans }
    }

    pub fn snapshot(&self) -> Vec<RenderPlan> {
        self.plans.lock().unwrap().clone()
    }
}

/// Running scheduler plus its observers
pub struct Rig {
    pub handle: SchedulerHandle,
    pub events: EventLog,
    pub render_log: RenderLog,
    render_rx: watch::Receiver<RenderPlan>,
    pub session: JoinHandle<driftplay::Result<()>>,
}

impl Rig {
    /// Latest render plan
    pub fn render(&self) -> RenderPlan {
        *self.render_rx.borrow()
    }

    /// Let just-woken tasks run to completion at the current instant
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    pub async fn shutdown(self) {
        self.handle.shutdown();
        let _ = self.session.await;
    }
}

/// Builder for a scheduler rig with scripted media
pub struct RigBuilder {
    config: EngineConfig,
    clips: Vec<Clip>,
    media: SimMedia,
    prepare_latency: Duration,
    prepare_latency_b: Option<Duration>,
    fail_a: u32,
    fail_b: u32,
    playback_error_a: Option<u64>,
    playback_error_b: Option<u64>,
}

impl RigBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clips: Vec::new(),
            media: SimMedia::new(30_000),
            prepare_latency: Duration::ZERO,
            prepare_latency_b: None,
            fail_a: 0,
            fail_b: 0,
            playback_error_a: None,
            playback_error_b: None,
        }
    }

    /// Add a clip with a declared duration cap and a media duration the
    /// simulated decoder will report
    pub fn clip(mut self, name: &str, declared_ms: Option<u64>, media_ms: u64) -> Self {
        let url = format!("https://example.com/{name}.mov");
        let mut clip = Clip::new(url.clone(), name);
        if let Some(declared) = declared_ms {
            clip = clip.with_duration(declared);
        }
        self.clips.push(clip);
        self.media.insert(url, media_ms);
        self
    }

    pub fn prepare_latency(mut self, latency: Duration) -> Self {
        self.prepare_latency = latency;
        self
    }

    pub fn failing_prepares_on_b(mut self, count: u32) -> Self {
        self.fail_b = count;
        self
    }

    /// Slow slot B's prepares down without failing them (readiness timeouts)
    #[allow(dead_code)]
    pub fn slow_prepares_on_b(mut self, latency: Duration) -> Self {
        self.prepare_latency_b = Some(latency);
        self
    }

    pub fn failing_prepares_on_a(mut self, count: u32) -> Self {
        self.fail_a = count;
        self
    }

    /// Script one playback error on slot A once its clip reaches a position
    pub fn playback_error_on_a_at(mut self, position_ms: u64) -> Self {
        self.playback_error_a = Some(position_ms);
        self
    }

    /// Script one playback error on slot B once its clip reaches a position
    pub fn playback_error_on_b_at(mut self, position_ms: u64) -> Self {
        self.playback_error_b = Some(position_ms);
        self
    }

    /// Spawn the scheduler and let it reach its initial state
    pub async fn start(self) -> Rig {
        let media = Arc::new(self.media);
        let (notice_tx, notice_rx) = notice_channel();
        let mut player_a = SimulatedPlayer::new(SlotId::A, notice_tx.clone(), media.clone())
            .with_prepare_latency(self.prepare_latency)
            .with_failing_prepares(self.fail_a);
        if let Some(position_ms) = self.playback_error_a {
            player_a = player_a.with_playback_failure_at(position_ms);
        }
        let mut player_b = SimulatedPlayer::new(SlotId::B, notice_tx, media)
            .with_prepare_latency(self.prepare_latency_b.unwrap_or(self.prepare_latency))
            .with_failing_prepares(self.fail_b);
        if let Some(position_ms) = self.playback_error_b {
            player_b = player_b.with_playback_failure_at(position_ms);
        }

        let playlist = Playlist::new(self.clips).expect("test playlist");
        let (scheduler, handle) = CrossfadeScheduler::new(
            self.config,
            playlist,
            Box::new(player_a),
            Box::new(player_b),
            notice_rx,
        )
        .expect("scheduler construction");

        let events = EventLog::attach(&handle);
        let render_log = RenderLog::attach(&handle);
        let render_rx = handle.render_plan();
        let session = tokio::spawn(scheduler.run());

        let rig = Rig {
            handle,
            events,
            render_log,
            render_rx,
            session,
        };
        rig.settle().await;
        rig
    }
}

/// Cut-mode config with the default timing constants
pub fn cut_config() -> EngineConfig {
    EngineConfig {
        mode: driftplay::TransitionMode::Cut,
        ..EngineConfig::default()
    }
}

/// Crossfade config with the default timing constants
pub fn crossfade_config() -> EngineConfig {
    EngineConfig::default()
}
