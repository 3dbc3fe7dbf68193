//! One active playback of a sample.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{Channel, StopOptions};
use crate::channels::MixerShared;
use crate::error::{MixerError, Result};
use crate::events::VolumeTarget;
use crate::graph::{AudioContext, Levels, NodeId};
use crate::sample::Sample;
use crate::timeline::FadeCallback;
use crate::volume::VolumeNodes;

/// Identity of a playing sound, unique within its mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(u64);

impl SoundId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options resolved by the mixer before construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Playback {
    pub looping: bool,
    pub fade_out: Option<Duration>,
    pub volume: Option<f32>,
}

struct SoundShared {
    id: SoundId,
    sample: Arc<Sample>,
    channel: Option<Channel>,
    ctx: Arc<dyn AudioContext>,
    volume: VolumeNodes,
    source: NodeId,
    looping: bool,
    started_at: Duration,
    stopped: AtomicBool,
    stopped_at: Mutex<Option<Duration>>,
    mixer: Weak<MixerShared>,
}

/// Handle to a playing sound.
///
/// Clones share the same playback. Dropping the handle does not stop it; the
/// mixer keeps the sound registered until it ends or is stopped.
#[derive(Clone)]
pub struct PlayingSound {
    shared: Arc<SoundShared>,
}

impl PlayingSound {
    /// Builds the source and volume stages, wires them into `input` and
    /// starts playback.
    pub(crate) fn start(
        mixer: &Arc<MixerShared>,
        id: SoundId,
        sample: Arc<Sample>,
        channel: Option<Channel>,
        input: NodeId,
        playback: Playback,
    ) -> Self {
        let ctx = mixer.ctx.clone();
        let volume = VolumeNodes::new(
            ctx.clone(),
            mixer.timeline.clone(),
            mixer.events.clone(),
            VolumeTarget::Sound(id),
            input,
        );
        if let Some(v) = playback.volume {
            volume.preset_volume(v);
        }
        let source = ctx.create_buffer_source(sample.clone(), playback.looping);
        ctx.connect(source, volume.input());
        let started_at = ctx.current_time();

        let sound = Self {
            shared: Arc::new(SoundShared {
                id,
                sample,
                channel,
                ctx,
                volume,
                source,
                looping: playback.looping,
                started_at,
                stopped: AtomicBool::new(false),
                stopped_at: Mutex::new(None),
                mixer: Arc::downgrade(mixer),
            }),
        };

        if let Some(fade) = playback.fade_out.filter(|_| !playback.looping) {
            let end = started_at.saturating_add(sound.shared.sample.duration());
            let start = end.saturating_sub(fade).max(started_at);
            let result = sound
                .shared
                .volume
                .schedule_fade(0.0, start, end, Some(sound.stop_callback()));
            if let Err(err) = result {
                tracing::warn!(sound = %id, %err, "fade-out not scheduled");
            }
        }
        sound
    }

    /// Returns the identity of this sound within its mixer.
    pub fn id(&self) -> SoundId {
        self.shared.id
    }

    /// Returns the sample being played.
    pub fn sample(&self) -> &Arc<Sample> {
        &self.shared.sample
    }

    /// Channel the sound plays on; `None` for master.
    pub fn channel(&self) -> Option<&Channel> {
        self.shared.channel.as_ref()
    }

    /// Returns true if the sample repeats until stopped.
    pub fn is_looping(&self) -> bool {
        self.shared.looping
    }

    /// Returns true once [`stop`](Self::stop) has run.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Context time since playback started, frozen once stopped.
    pub fn elapsed(&self) -> Duration {
        let end = (*self.shared.stopped_at.lock()).unwrap_or_else(|| self.shared.ctx.current_time());
        end.saturating_sub(self.shared.started_at)
    }

    /// Playback position as a fraction of the sample.
    ///
    /// Wraps when looping, clamps to 0..=1 otherwise. A zero-length sample
    /// reports 1.
    pub fn progress(&self) -> f32 {
        let duration = self.shared.sample.duration().as_secs_f64();
        if duration == 0.0 {
            return 1.0;
        }
        let elapsed = self.elapsed().as_secs_f64();
        if self.shared.looping {
            ((elapsed % duration) / duration) as f32
        } else {
            (elapsed / duration).clamp(0.0, 1.0) as f32
        }
    }

    /// True once a non-looping source has played through. An empty sample
    /// ends at once, looping or not.
    pub(crate) fn has_ended(&self) -> bool {
        let shared = &self.shared;
        (!shared.looping || shared.sample.frames() == 0) && shared.ctx.source_ended(shared.source)
    }

    /// Stops immediately and deregisters. Later calls do nothing.
    pub fn stop(&self) {
        let shared = &self.shared;
        if shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        *shared.stopped_at.lock() = Some(shared.ctx.current_time());
        shared.volume.cancel_fade();
        shared.ctx.stop_source(shared.source);
        shared.ctx.release(shared.source);
        shared.volume.release();
        tracing::debug!(sound = %shared.id, sample = shared.sample.name(), "sound stopped");

        if let Some(mixer) = shared.mixer.upgrade() {
            if let Err(err) = mixer.deregister(shared.id) {
                tracing::error!(%err, "playing sound lifecycle broken");
            }
        }
    }

    /// Stops, fading out first when `options.fade_out` is set.
    pub fn stop_with(&self, options: StopOptions) {
        match options.fade_out {
            Some(fade) if !fade.is_zero() && !self.is_stopped() => {
                if let Err(err) = self.shared.volume.fade_out(fade, Some(self.stop_callback())) {
                    tracing::warn!(sound = %self.shared.id, %err, "stop fade refused");
                    self.stop();
                }
            }
            _ => self.stop(),
        }
    }

    /// Returns the volume stage of this sound.
    pub fn volume(&self) -> f32 {
        self.shared.volume.volume()
    }

    /// Sets the volume stage. Fails with `Closed` once stopped.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.live()?.set_volume(volume)
    }

    /// Returns the current fade envelope value.
    pub fn fade_volume(&self) -> f32 {
        self.shared.volume.fade_volume()
    }

    /// Returns true while the volume stage is 0.
    pub fn is_muted(&self) -> bool {
        self.shared.volume.is_muted()
    }

    /// Mutes the sound. Does nothing once stopped.
    pub fn mute(&self) {
        if let Ok(volume) = self.live() {
            volume.mute();
        }
    }

    /// Restores the volume held before muting. Does nothing once stopped.
    pub fn unmute(&self) {
        if let Ok(volume) = self.live() {
            volume.unmute();
        }
    }

    /// Ramps the fade envelope to `target`. Fails with `Closed` once stopped.
    pub fn fade_to(&self, target: f32, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.live()?.fade_to(target, duration, on_complete)
    }

    /// Fades the envelope up to 1.
    pub fn fade_in(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.live()?.fade_in(duration, on_complete)
    }

    /// Fades the envelope down to 0 without stopping the sound.
    pub fn fade_out(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.live()?.fade_out(duration, on_complete)
    }

    /// Peak and RMS of the sound's post-fade output.
    pub fn levels(&self) -> Levels {
        self.shared.volume.levels()
    }

    /// The controller, while the sound has not been stopped.
    fn live(&self) -> Result<&VolumeNodes> {
        if self.is_stopped() {
            return Err(MixerError::Closed);
        }
        Ok(&self.shared.volume)
    }

    /// Completion that stops this sound, without keeping it alive.
    fn stop_callback(&self) -> FadeCallback {
        let weak = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                PlayingSound { shared }.stop();
            }
        })
    }
}

impl fmt::Debug for PlayingSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayingSound")
            .field("id", &self.shared.id)
            .field("sample", &self.shared.sample.name())
            .field("channel", &self.shared.channel.as_ref().map(|c| c.name()))
            .field("looping", &self.shared.looping)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl PartialEq for PlayingSound {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
