//! Compositor contract
//!
//! The scheduler computes, for each slot, whether it should be rendered, at
//! what opacity, and in which stacking order. The rendering layer consumes
//! the latest [`RenderPlan`] from a watch channel and draws; the core never
//! draws anything itself.
//!
//! Ordering rules:
//! - Crossfade: during a transition the incoming slot is always stacked
//!   above the outgoing one and its opacity ramps linearly from 0 to 1; the
//!   outgoing slot's opacity is held at 1 and the incoming slot occludes it
//!   by opacity alone.
//! - Cut: only the active slot is ever in the render set, so stacking order
//!   is irrelevant.

use super::slot::SlotId;
use serde::Serialize;
use std::time::Duration;

/// Render directives for one slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotLayer {
    pub visible: bool,
    pub opacity: f32,
    pub stack_order: i32,
}

impl SlotLayer {
    fn hidden() -> Self {
        Self {
            visible: false,
            opacity: 0.0,
            stack_order: 0,
        }
    }
}

/// Render directives for both slots, indexed by [`SlotId`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderPlan {
    layers: [SlotLayer; 2],
}

impl RenderPlan {
    /// Nothing rendered (before priming completes and after teardown)
    pub fn hidden() -> Self {
        Self {
            layers: [SlotLayer::hidden(), SlotLayer::hidden()],
        }
    }

    /// Steady state: the active slot alone, fully opaque, on top
    pub fn steady(active: SlotId) -> Self {
        let mut plan = Self::hidden();
        plan.layers[active.index()] = SlotLayer {
            visible: true,
            opacity: 1.0,
            stack_order: 1,
        };
        plan
    }

    /// Mid-crossfade: outgoing held below at its current opacity, incoming
    /// above at the interpolated opacity
    pub fn transition(from: SlotId, to: SlotId, from_opacity: f32, to_opacity: f32) -> Self {
        let mut plan = Self::hidden();
        plan.layers[from.index()] = SlotLayer {
            visible: true,
            opacity: from_opacity,
            stack_order: 0,
        };
        plan.layers[to.index()] = SlotLayer {
            visible: true,
            opacity: to_opacity,
            stack_order: 1,
        };
        plan
    }

    pub fn layer(&self, id: SlotId) -> &SlotLayer {
        &self.layers[id.index()]
    }

    /// Number of slots currently in the render set
    pub fn visible_count(&self) -> usize {
        self.layers.iter().filter(|l| l.visible).count()
    }
}

/// Linear fade-in progress, clamped to [0, 1]
///
/// A zero-length fade is complete immediately.
pub fn fade_progress(elapsed: Duration, fade: Duration) -> f32 {
    if fade.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / fade.as_secs_f32()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_plan_renders_active_only() {
        let plan = RenderPlan::steady(SlotId::B);
        assert_eq!(plan.visible_count(), 1);
        assert!(!plan.layer(SlotId::A).visible);
        assert!(plan.layer(SlotId::B).visible);
        assert_eq!(plan.layer(SlotId::B).opacity, 1.0);
    }

    #[test]
    fn test_transition_plan_stacks_incoming_above() {
        let plan = RenderPlan::transition(SlotId::A, SlotId::B, 1.0, 0.4);
        assert_eq!(plan.visible_count(), 2);
        assert!(plan.layer(SlotId::B).stack_order > plan.layer(SlotId::A).stack_order);
        assert_eq!(plan.layer(SlotId::A).opacity, 1.0);
        assert_eq!(plan.layer(SlotId::B).opacity, 0.4);
    }

    #[test]
    fn test_fade_progress_linear() {
        let fade = Duration::from_millis(2000);
        assert_eq!(fade_progress(Duration::ZERO, fade), 0.0);
        assert!((fade_progress(Duration::from_millis(1000), fade) - 0.5).abs() < 1e-6);
        assert_eq!(fade_progress(Duration::from_millis(2000), fade), 1.0);
        // Clamped past the end
        assert_eq!(fade_progress(Duration::from_millis(3000), fade), 1.0);
    }

    #[test]
    fn test_zero_fade_is_complete_immediately() {
        assert_eq!(fade_progress(Duration::ZERO, Duration::ZERO), 1.0);
    }
}
