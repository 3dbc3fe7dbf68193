//! Volume and fade control for one mixing point.
//!
//! Every mixing point (master, channel, playing sound) owns two cascaded gain
//! nodes: the volume stage, driven by `set_volume`/`mute`/`unmute`, and the
//! fade stage, driven by ramps. The effective gain is their product, so an
//! explicit mute never disturbs a running fade and the other way round.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{MixerError, Result};
use crate::events::{EventBus, MixerEvent, VolumeTarget};
use crate::graph::{AudioContext, Levels, NodeId};
use crate::timeline::{FadeCallback, Timeline, TimerId};

/// Volume restored by `unmute` after an implicit mute (`set_volume(0)`).
const IMPLICIT_MUTE_RESTORE: f32 = 1.0;

#[derive(Debug)]
struct VolumeState {
    volume: f32,
    /// Restore target for `unmute`; set whenever volume is 0.
    muted_prior: Option<f32>,
    /// Completion of the in-flight fade.
    fade: Option<TimerId>,
}

/// The two gain stages of a mixing point.
pub struct VolumeNodes {
    ctx: Arc<dyn AudioContext>,
    timeline: Arc<Timeline>,
    events: Arc<EventBus>,
    target: VolumeTarget,
    volume_node: NodeId,
    fade_node: NodeId,
    state: Arc<Mutex<VolumeState>>,
}

impl VolumeNodes {
    /// Creates both stages, wiring volume -> fade -> `output`.
    pub(crate) fn new(
        ctx: Arc<dyn AudioContext>,
        timeline: Arc<Timeline>,
        events: Arc<EventBus>,
        target: VolumeTarget,
        output: NodeId,
    ) -> Self {
        let volume_node = ctx.create_gain(1.0);
        let fade_node = ctx.create_gain(1.0);
        ctx.connect(volume_node, fade_node);
        ctx.connect(fade_node, output);
        Self {
            ctx,
            timeline,
            events,
            target,
            volume_node,
            fade_node,
            state: Arc::new(Mutex::new(VolumeState {
                volume: 1.0,
                muted_prior: None,
                fade: None,
            })),
        }
    }

    /// Node that audio feeding this mixing point connects to.
    pub fn input(&self) -> NodeId {
        self.volume_node
    }

    /// Node carrying the post-fade signal.
    pub fn output(&self) -> NodeId {
        self.fade_node
    }

    /// The unmuted target gain; 0 while muted.
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Current value of the fade envelope.
    pub fn fade_volume(&self) -> f32 {
        self.ctx.gain_value(self.fade_node)
    }

    /// Returns true while the volume stage is 0.
    pub fn is_muted(&self) -> bool {
        self.state.lock().volume == 0.0
    }

    /// True while a fade completion is pending.
    pub fn is_fading(&self) -> bool {
        self.state.lock().fade.is_some()
    }

    /// Sets the volume stage.
    ///
    /// Negative or non-finite values are rejected. Setting 0 mutes implicitly:
    /// a later `unmute` restores 1.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(MixerError::InvalidArgument(format!(
                "volume must be a non-negative number, got {volume}"
            )));
        }
        {
            let mut state = self.state.lock();
            if state.volume == volume {
                return Ok(());
            }
            state.muted_prior = if volume == 0.0 {
                Some(IMPLICIT_MUTE_RESTORE)
            } else {
                None
            };
            state.volume = volume;
        }
        self.apply(volume);
        Ok(())
    }

    /// Mutes, remembering the current volume. No-op when already at 0.
    pub fn mute(&self) {
        {
            let mut state = self.state.lock();
            if state.volume == 0.0 {
                return;
            }
            state.muted_prior = Some(state.volume);
            state.volume = 0.0;
        }
        self.apply(0.0);
    }

    /// Restores the volume remembered by `mute` (1 if none). No-op unless muted.
    pub fn unmute(&self) {
        let restored = {
            let mut state = self.state.lock();
            if state.volume != 0.0 {
                return;
            }
            let restored = state.muted_prior.take().unwrap_or(IMPLICIT_MUTE_RESTORE);
            state.volume = restored;
            restored
        };
        self.apply(restored);
    }

    /// Mutes or unmutes.
    pub fn set_muted(&self, muted: bool) {
        if muted { self.mute() } else { self.unmute() }
    }

    /// Ramps the fade envelope from its current value to `target` (0..=1).
    ///
    /// `on_complete` runs once, from `Channels::update`, when the ramp ends.
    /// A later fade (or `cancel_fade`) supersedes this one and its callback
    /// never runs.
    pub fn fade_to(&self, target: f32, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        let now = self.ctx.current_time();
        self.schedule_fade(target, now, now.saturating_add(duration), on_complete)
    }

    /// Fades the envelope up to 1.
    pub fn fade_in(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.fade_to(1.0, duration, on_complete)
    }

    /// Fades the envelope down to 0.
    pub fn fade_out(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.fade_to(0.0, duration, on_complete)
    }

    /// Like [`fade_to`](Self::fade_to), but the envelope holds its current
    /// value until `start` (context time) and reaches `target` at `end`.
    pub fn schedule_fade(
        &self,
        target: f32,
        start: Duration,
        end: Duration,
        on_complete: Option<FadeCallback>,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&target) {
            return Err(MixerError::InvalidArgument(format!(
                "fade target must be within 0..=1, got {target}"
            )));
        }
        let now = self.ctx.current_time();
        let start = start.max(now);
        let end = end.max(start);

        self.cancel_fade();
        self.ctx.linear_ramp(self.fade_node, target, start, end);

        let id = self.timeline.reserve();
        let state = self.state.clone();
        self.timeline.schedule(
            id,
            end,
            Box::new(move || {
                {
                    let mut st = state.lock();
                    if st.fade == Some(id) {
                        st.fade = None;
                    }
                }
                if let Some(cb) = on_complete {
                    cb();
                }
            }),
        );
        self.state.lock().fade = Some(id);
        tracing::debug!(point = ?self.target, fade_to = target, ?start, ?end, "fade scheduled");
        Ok(())
    }

    /// Freezes the envelope where it is and drops the pending completion.
    pub fn cancel_fade(&self) {
        let pending = self.state.lock().fade.take();
        if let Some(id) = pending {
            self.timeline.cancel(id);
        }
        self.ctx.cancel_ramps(self.fade_node);
    }

    /// Analysis tap on the post-fade signal.
    pub fn levels(&self) -> Levels {
        self.ctx.levels(self.fade_node)
    }

    /// Sets the starting volume of a freshly built controller without
    /// announcing it. The caller has validated `volume`.
    pub(crate) fn preset_volume(&self, volume: f32) {
        {
            let mut state = self.state.lock();
            state.volume = volume;
            state.muted_prior = (volume == 0.0).then_some(IMPLICIT_MUTE_RESTORE);
        }
        self.ctx.set_gain_value(self.volume_node, volume);
    }

    /// Drops the pending fade and removes both nodes from the graph.
    pub(crate) fn release(&self) {
        let pending = self.state.lock().fade.take();
        if let Some(id) = pending {
            self.timeline.cancel(id);
        }
        self.ctx.release(self.volume_node);
        self.ctx.release(self.fade_node);
    }

    fn apply(&self, volume: f32) {
        self.ctx.set_gain_value(self.volume_node, volume);
        self.events.emit(MixerEvent::VolumeChanged {
            target: self.target.clone(),
            volume,
        });
    }
}

impl std::fmt::Debug for VolumeNodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VolumeNodes")
            .field("target", &self.target)
            .field("volume", &state.volume)
            .field("muted_prior", &state.muted_prior)
            .field("fading", &state.fade.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderContext;
    use crate::pcm::Format;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        ctx: Arc<RenderContext>,
        timeline: Arc<Timeline>,
        events: Arc<EventBus>,
        nodes: VolumeNodes,
    }

    fn fixture() -> Fixture {
        let ctx = RenderContext::new(Format::mono(8000));
        let timeline = Arc::new(Timeline::new());
        let events = Arc::new(EventBus::new());
        let nodes = VolumeNodes::new(
            ctx.clone(),
            timeline.clone(),
            events.clone(),
            VolumeTarget::Master,
            ctx.destination(),
        );
        Fixture {
            ctx,
            timeline,
            events,
            nodes,
        }
    }

    fn pump(timeline: &Timeline, ctx: &RenderContext) {
        while let Some(cb) = timeline.pop_due(ctx.current_time()) {
            cb();
        }
    }

    fn counter() -> (Arc<AtomicUsize>, FadeCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let c = hits.clone();
        (
            hits,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_set_volume_roundtrip() {
        let f = fixture();
        for v in [0.0, 0.25, 1.0, 3.5] {
            f.nodes.set_volume(v).unwrap();
            assert_eq!(f.nodes.volume(), v);
        }
    }

    #[test]
    fn test_negative_volume_rejected() {
        let f = fixture();
        f.nodes.set_volume(0.4).unwrap();
        let err = f.nodes.set_volume(-1.0).unwrap_err();
        assert!(matches!(err, MixerError::InvalidArgument(_)));
        assert!(matches!(f.nodes.set_volume(f32::NAN), Err(MixerError::InvalidArgument(_))));
        assert_eq!(f.nodes.volume(), 0.4);
    }

    #[test]
    fn test_mute_unmute_restores() {
        let f = fixture();
        f.nodes.set_volume(0.6).unwrap();
        f.nodes.mute();
        assert_eq!(f.nodes.volume(), 0.0);
        assert!(f.nodes.is_muted());
        f.nodes.unmute();
        assert_eq!(f.nodes.volume(), 0.6);
    }

    #[test]
    fn test_implicit_mute_restores_one() {
        let f = fixture();
        f.nodes.set_volume(0.6).unwrap();
        f.nodes.set_volume(0.0).unwrap();
        f.nodes.unmute();
        assert_eq!(f.nodes.volume(), 1.0);

        f.nodes.set_volume(0.0).unwrap();
        f.nodes.set_volume(0.0).unwrap();
        f.nodes.unmute();
        assert_eq!(f.nodes.volume(), 1.0);
    }

    #[test]
    fn test_mute_then_zero_keeps_prior() {
        let f = fixture();
        f.nodes.set_volume(0.3).unwrap();
        f.nodes.mute();
        f.nodes.set_volume(0.0).unwrap();
        f.nodes.unmute();
        assert_eq!(f.nodes.volume(), 0.3);
    }

    #[test]
    fn test_noops_do_not_notify() {
        let f = fixture();
        let (hits, _) = counter();
        let c = hits.clone();
        f.events.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        f.nodes.set_volume(1.0).unwrap(); // unchanged
        f.nodes.unmute(); // not muted
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        f.nodes.mute();
        f.nodes.mute(); // already at 0
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_volume_applied_to_graph() {
        let f = fixture();
        f.nodes.set_volume(0.25).unwrap();
        assert_eq!(f.ctx.gain_value(f.nodes.input()), 0.25);
        f.nodes.mute();
        assert_eq!(f.ctx.gain_value(f.nodes.input()), 0.0);
    }

    #[test]
    fn test_fade_completes_once() {
        let f = fixture();
        let (hits, cb) = counter();
        f.nodes.fade_out(Duration::from_millis(100), Some(cb)).unwrap();
        assert!(f.nodes.is_fading());

        f.ctx.advance(Duration::from_millis(50));
        pump(&f.timeline, &f.ctx);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!((f.nodes.fade_volume() - 0.5).abs() < 1e-3);

        f.ctx.advance(Duration::from_millis(50));
        pump(&f.timeline, &f.ctx);
        pump(&f.timeline, &f.ctx);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(f.nodes.fade_volume(), 0.0);
        assert!(!f.nodes.is_fading());
    }

    #[test]
    fn test_fade_supersession() {
        let f = fixture();
        let (out_hits, out_cb) = counter();
        let (in_hits, in_cb) = counter();

        f.nodes.fade_out(Duration::from_millis(100), Some(out_cb)).unwrap();
        f.ctx.advance(Duration::from_millis(40));
        f.nodes.fade_in(Duration::from_millis(100), Some(in_cb)).unwrap();
        // starts from the interpolated value, not from the old target
        assert!((f.nodes.fade_volume() - 0.6).abs() < 1e-3);

        f.ctx.advance(Duration::from_millis(60));
        pump(&f.timeline, &f.ctx);
        assert_eq!(out_hits.load(Ordering::SeqCst), 0);
        assert_eq!(in_hits.load(Ordering::SeqCst), 0);

        f.ctx.advance(Duration::from_millis(40));
        pump(&f.timeline, &f.ctx);
        assert_eq!(out_hits.load(Ordering::SeqCst), 0);
        assert_eq!(in_hits.load(Ordering::SeqCst), 1);
        assert_eq!(f.nodes.fade_volume(), 1.0);
    }

    #[test]
    fn test_mute_does_not_disturb_fade() {
        let f = fixture();
        f.nodes.fade_out(Duration::from_millis(100), None).unwrap();
        f.ctx.advance(Duration::from_millis(50));
        f.nodes.mute();
        assert!((f.nodes.fade_volume() - 0.5).abs() < 1e-3);
        f.nodes.unmute();
        assert_eq!(f.nodes.volume(), 1.0);
        assert!(f.nodes.is_fading());
    }

    #[test]
    fn test_cancel_fade_drops_callback() {
        let f = fixture();
        let (hits, cb) = counter();
        f.nodes.fade_out(Duration::from_millis(10), Some(cb)).unwrap();
        f.nodes.cancel_fade();
        f.ctx.advance(Duration::from_millis(20));
        pump(&f.timeline, &f.ctx);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(f.timeline.len(), 0);
    }

    #[test]
    fn test_unbounded_fade_saturates() {
        let f = fixture();
        f.ctx.advance(Duration::from_millis(10));
        f.nodes.fade_out(Duration::MAX, None).unwrap();
        assert!(f.nodes.is_fading());
        f.ctx.advance(Duration::from_millis(10));
        pump(&f.timeline, &f.ctx);
        assert!(f.nodes.is_fading());
        assert!((f.nodes.fade_volume() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_fade_target_validated() {
        let f = fixture();
        assert!(matches!(
            f.nodes.fade_to(1.5, Duration::from_millis(10), None),
            Err(MixerError::InvalidArgument(_))
        ));
        assert!(!f.nodes.is_fading());
    }

    #[test]
    fn test_scheduled_fade_holds_until_start() {
        let f = fixture();
        f.nodes
            .schedule_fade(0.0, Duration::from_millis(50), Duration::from_millis(100), None)
            .unwrap();
        f.ctx.advance(Duration::from_millis(40));
        assert_eq!(f.nodes.fade_volume(), 1.0);
        f.ctx.advance(Duration::from_millis(35));
        assert!((f.nodes.fade_volume() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_release_removes_nodes() {
        let f = fixture();
        let before = f.ctx.node_count();
        f.nodes.fade_out(Duration::from_millis(10), None).unwrap();
        f.nodes.release();
        assert_eq!(f.ctx.node_count(), before - 2);
        assert_eq!(f.timeline.len(), 0);
    }
}
