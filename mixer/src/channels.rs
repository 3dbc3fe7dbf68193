//! The mixer root: master bus, channel registry and playing sounds.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{Channel, ChannelKind, ChannelOptions, ChannelRef, PlayOptions, StopOptions};
use crate::error::{MixerError, Result};
use crate::events::{EventBus, EventKind, ListenerId, MixerEvent, VolumeTarget};
use crate::graph::{AudioContext, NodeId};
use crate::playing::{Playback, PlayingSound, SoundId};
use crate::sample::SampleRegistry;
use crate::timeline::{FadeCallback, Timeline};
use crate::volume::VolumeNodes;

#[derive(Default)]
struct MixerState {
    /// Creation order.
    channels: Vec<Channel>,
    by_name: HashMap<String, usize>,
    /// Play order.
    playing: Vec<PlayingSound>,
}

pub(crate) struct MixerShared {
    pub(crate) ctx: Arc<dyn AudioContext>,
    pub(crate) timeline: Arc<Timeline>,
    pub(crate) events: Arc<EventBus>,
    samples: Arc<dyn SampleRegistry>,
    master: VolumeNodes,
    state: Mutex<MixerState>,
    next_sound: AtomicU64,
}

impl MixerShared {
    /// Removes a sound from the registry.
    pub(crate) fn deregister(&self, id: SoundId) -> Result<()> {
        {
            let mut state = self.state.lock();
            let pos = state
                .playing
                .iter()
                .position(|s| s.id() == id)
                .ok_or(MixerError::NotRegistered(id))?;
            state.playing.remove(pos);
        }
        self.events.emit(MixerEvent::PlayingSoundsUpdated);
        Ok(())
    }
}

impl Drop for MixerShared {
    fn drop(&mut self) {
        let state = std::mem::take(self.state.get_mut());
        for sound in state.playing {
            sound.stop();
        }
        for channel in state.channels {
            channel.release();
        }
        self.master.release();
    }
}

/// A resolved selector.
enum Route {
    Master,
    Channel(Channel),
}

/// The mixer.
///
/// Clones share one mixer. Every channel and sound is fed into the master
/// volume stages, which feed the context destination. Fade completions and
/// natural ends are only acted on by [`update`](Self::update), which the
/// owner calls from its control loop.
#[derive(Clone)]
pub struct Channels {
    shared: Arc<MixerShared>,
}

impl Channels {
    /// Creates a mixer rendering into `ctx`, resolving samples through
    /// `samples`.
    pub fn new(ctx: Arc<dyn AudioContext>, samples: Arc<dyn SampleRegistry>) -> Self {
        let timeline = Arc::new(Timeline::new());
        let events = Arc::new(EventBus::new());
        let master = VolumeNodes::new(
            ctx.clone(),
            timeline.clone(),
            events.clone(),
            VolumeTarget::Master,
            ctx.destination(),
        );
        Self {
            shared: Arc::new(MixerShared {
                ctx,
                timeline,
                events,
                samples,
                master,
                state: Mutex::new(MixerState::default()),
                next_sound: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<MixerShared>) -> Self {
        Self { shared }
    }

    /// Returns the render context the mixer builds its graph in.
    pub fn context(&self) -> &Arc<dyn AudioContext> {
        &self.shared.ctx
    }

    /// Master volume stages.
    pub fn master(&self) -> &VolumeNodes {
        &self.shared.master
    }

    /// Creates a channel feeding the master bus.
    ///
    /// Names are trimmed; blank names are rejected and names are unique.
    pub fn create_channel(&self, name: &str, options: ChannelOptions) -> Result<Channel> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MixerError::InvalidArgument("channel name is blank".to_string()));
        }
        if self.shared.state.lock().by_name.contains_key(name) {
            return Err(MixerError::DuplicateChannel(name.to_string()));
        }

        let shared = &self.shared;
        let volume = VolumeNodes::new(
            shared.ctx.clone(),
            shared.timeline.clone(),
            shared.events.clone(),
            VolumeTarget::Channel(name.to_string()),
            shared.master.input(),
        );
        let kind = options.kind;
        let channel = Channel::new(shared, name.to_string(), volume, options);
        {
            let mut state = shared.state.lock();
            let index = state.channels.len();
            state.channels.push(channel.clone());
            state.by_name.insert(name.to_string(), index);
        }
        tracing::debug!(channel = name, ?kind, "channel created");
        shared.events.emit(MixerEvent::ChannelsUpdated);
        Ok(channel)
    }

    /// Looks a channel up by name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        let state = self.shared.state.lock();
        state.by_name.get(name).map(|&i| state.channels[i].clone())
    }

    /// All channels, in creation order.
    pub fn channels(&self) -> Vec<Channel> {
        self.shared.state.lock().channels.clone()
    }

    /// Active sounds, in play order.
    pub fn playing_sounds(&self) -> Vec<PlayingSound> {
        self.shared.state.lock().playing.clone()
    }

    /// Starts playing the sample registered as `sample`.
    ///
    /// On a monophonic channel every sound already playing there is stopped
    /// immediately. Fails before touching any state when the sample or the
    /// channel is unknown or the volume is invalid.
    pub fn play(&self, sample: &str, options: PlayOptions) -> Result<PlayingSound> {
        let shared = &self.shared;
        let data = shared
            .samples
            .sample_by_name(sample)
            .ok_or_else(|| MixerError::SampleNotFound(sample.to_string()))?;
        let route = self.resolve(&options.channel)?;

        let channel = match &route {
            Route::Master => None,
            Route::Channel(c) => Some(c.clone()),
        };
        let defaults = channel.as_ref().map(|c| c.play_defaults());
        let playback = Playback {
            looping: options
                .looping
                .or(defaults.and_then(|d| d.looping))
                .unwrap_or(false),
            fade_out: options.fade_out.or(defaults.and_then(|d| d.fade_out)),
            volume: options.volume.or(defaults.and_then(|d| d.volume)),
        };
        if let Some(v) = playback.volume {
            if !v.is_finite() || v < 0.0 {
                return Err(MixerError::InvalidArgument(format!(
                    "volume must be a non-negative number, got {v}"
                )));
            }
        }

        let id = SoundId::from_raw(shared.next_sound.fetch_add(1, Ordering::Relaxed));
        let input = self.input_of(&route);
        let sound = PlayingSound::start(shared, id, data, channel.clone(), input, playback);

        if let Some(c) = channel.as_ref().filter(|c| c.kind() == ChannelKind::Monophonic) {
            let stolen = self.sounds_on(&Route::Channel(c.clone()));
            if !stolen.is_empty() {
                tracing::debug!(channel = c.name(), stolen = stolen.len(), "voice stealing");
            }
            for old in stolen {
                old.stop();
            }
        }

        shared.state.lock().playing.push(sound.clone());
        tracing::debug!(
            sound = %id,
            sample,
            channel = channel.as_ref().map(|c| c.name()).unwrap_or("master"),
            looping = playback.looping,
            "sound started"
        );
        shared.events.emit(MixerEvent::PlayingSoundsUpdated);
        Ok(sound)
    }

    /// Stops sounds immediately: every one when `selector` is `None`,
    /// otherwise those on the selected channel (or directly on master).
    pub fn stop_all(&self, selector: Option<ChannelRef>) -> Result<()> {
        self.stop_all_with(selector, StopOptions::immediate())
    }

    /// Like [`stop_all`](Self::stop_all), using `options` for every matched sound.
    pub fn stop_all_with(&self, selector: Option<ChannelRef>, options: StopOptions) -> Result<()> {
        let targets = match selector {
            None => self.playing_sounds(),
            Some(selector) => {
                let route = self.resolve(&selector)?;
                self.sounds_on(&route)
            }
        };
        for sound in targets {
            sound.stop_with(options);
        }
        Ok(())
    }

    /// Sets the volume stage of a channel or of master.
    pub fn set_volume(&self, target: ChannelRef, volume: f32) -> Result<()> {
        let route = self.resolve(&target)?;
        self.volume_of(&route).set_volume(volume)
    }

    /// Returns the volume stage of a channel or of master.
    pub fn volume(&self, target: ChannelRef) -> Result<f32> {
        let route = self.resolve(&target)?;
        Ok(self.volume_of(&route).volume())
    }

    /// Mutes or unmutes a channel or master.
    pub fn set_mute(&self, target: ChannelRef, muted: bool) -> Result<()> {
        let route = self.resolve(&target)?;
        self.volume_of(&route).set_muted(muted);
        Ok(())
    }

    /// Returns true while the target's volume stage is 0.
    pub fn is_muted(&self, target: ChannelRef) -> Result<bool> {
        let route = self.resolve(&target)?;
        Ok(self.volume_of(&route).is_muted())
    }

    /// Ramps the fade envelope of a channel or of master.
    pub fn fade_to(
        &self,
        target: ChannelRef,
        value: f32,
        duration: Duration,
        on_complete: Option<FadeCallback>,
    ) -> Result<()> {
        let route = self.resolve(&target)?;
        self.volume_of(&route).fade_to(value, duration, on_complete)
    }

    /// Delivers due fade completions, then stops sounds that played through.
    ///
    /// Call this regularly on the control timeline, typically after each
    /// rendered block.
    pub fn update(&self) {
        let shared = &self.shared;
        let now = shared.ctx.current_time();
        while let Some(callback) = shared.timeline.pop_due(now) {
            callback();
        }

        let ended: Vec<PlayingSound> = shared
            .state
            .lock()
            .playing
            .iter()
            .filter(|s| s.has_ended())
            .cloned()
            .collect();
        for sound in ended {
            tracing::debug!(sound = %sound.id(), "sound reached its end");
            sound.stop();
        }
    }

    /// Registers a listener for every event.
    pub fn subscribe(&self, f: impl Fn(&MixerEvent) + Send + Sync + 'static) -> ListenerId {
        self.shared.events.subscribe(f)
    }

    /// Registers a listener for one kind of event.
    pub fn on(&self, kind: EventKind, f: impl Fn(&MixerEvent) + Send + Sync + 'static) -> ListenerId {
        self.shared.events.on(kind, f)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    /// Resumes a suspended context.
    pub async fn resume(&self) {
        self.shared.ctx.resume().await;
    }

    /// Resolves a selector against this mixer.
    fn resolve(&self, target: &ChannelRef) -> Result<Route> {
        match target {
            ChannelRef::Master => Ok(Route::Master),
            ChannelRef::Name(name) => self
                .channel(name)
                .map(Route::Channel)
                .ok_or_else(|| MixerError::ChannelNotFound(name.clone())),
            ChannelRef::Channel(c) if c.belongs_to(&self.shared) => Ok(Route::Channel(c.clone())),
            ChannelRef::Channel(c) => Err(MixerError::ChannelNotFound(c.name().to_string())),
        }
    }

    fn input_of(&self, route: &Route) -> NodeId {
        match route {
            Route::Master => self.shared.master.input(),
            Route::Channel(c) => c.input(),
        }
    }

    fn volume_of<'a>(&'a self, route: &'a Route) -> &'a VolumeNodes {
        match route {
            Route::Master => &self.shared.master,
            Route::Channel(c) => c.volume_nodes(),
        }
    }

    fn sounds_on(&self, route: &Route) -> Vec<PlayingSound> {
        self.shared
            .state
            .lock()
            .playing
            .iter()
            .filter(|s| match route {
                Route::Master => s.channel().is_none(),
                Route::Channel(c) => s.channel() == Some(c),
            })
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Channels")
            .field("master", &self.shared.master)
            .field("channels", &state.channels)
            .field("playing", &state.playing.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderContext;
    use crate::pcm::Format;
    use crate::sample::{Sample, SampleBank};

    fn mixer() -> (Arc<RenderContext>, Channels) {
        let ctx = RenderContext::new(Format::mono(8000));
        let bank = Arc::new(SampleBank::new());
        bank.insert(Sample::constant("tick", Format::mono(8000), 0.5, Duration::from_millis(100)));
        (ctx.clone(), Channels::new(ctx, bank))
    }

    #[test]
    fn test_create_channel_trims_and_rejects() {
        let (_, mixer) = mixer();
        let fx = mixer.create_channel("  fx ", ChannelOptions::default()).unwrap();
        assert_eq!(fx.name(), "fx");
        assert!(matches!(
            mixer.create_channel("fx", ChannelOptions::default()),
            Err(MixerError::DuplicateChannel(_))
        ));
        assert!(matches!(
            mixer.create_channel("", ChannelOptions::default()),
            Err(MixerError::InvalidArgument(_))
        ));
        assert!(matches!(
            mixer.create_channel("   ", ChannelOptions::default()),
            Err(MixerError::InvalidArgument(_))
        ));
        assert_eq!(mixer.channels().len(), 1);
    }

    #[test]
    fn test_channel_from_other_mixer_rejected() {
        let (_, a) = mixer();
        let (_, b) = mixer();
        let foreign = b.create_channel("fx", ChannelOptions::default()).unwrap();
        a.create_channel("fx", ChannelOptions::default()).unwrap();
        let err = a.play("tick", PlayOptions::new().on(&foreign)).unwrap_err();
        assert!(matches!(err, MixerError::ChannelNotFound(_)));
        assert!(a.playing_sounds().is_empty());
    }

    #[test]
    fn test_invalid_volume_leaves_no_trace() {
        let (ctx, mixer) = mixer();
        let nodes = ctx.node_count();
        let err = mixer.play("tick", PlayOptions::new().volume(-0.5)).unwrap_err();
        assert!(matches!(err, MixerError::InvalidArgument(_)));
        assert_eq!(ctx.node_count(), nodes);
    }

    #[test]
    fn test_channel_defaults_apply() {
        let (_, mixer) = mixer();
        let music = mixer
            .create_channel(
                "music",
                ChannelOptions::default().with_play(PlayOptions::new().looping(true).volume(0.5)),
            )
            .unwrap();
        let sound = music.play("tick", PlayOptions::new()).unwrap();
        assert!(sound.is_looping());
        assert_eq!(sound.volume(), 0.5);

        let once = music.play("tick", PlayOptions::new().looping(false)).unwrap();
        assert!(!once.is_looping());
    }

    #[test]
    fn test_deregister_unknown() {
        let (_, mixer) = mixer();
        let err = mixer.shared.deregister(SoundId::from_raw(99)).unwrap_err();
        assert!(matches!(err, MixerError::NotRegistered(_)));
    }

    #[test]
    fn test_drop_releases_graph() {
        let (ctx, mixer) = mixer();
        let fx = mixer.create_channel("fx", ChannelOptions::default()).unwrap();
        let sound = fx.play("tick", PlayOptions::new()).unwrap();
        drop(mixer);
        assert_eq!(ctx.node_count(), 1);
        assert!(sound.is_stopped());
        assert!(matches!(fx.play("tick", PlayOptions::new()), Err(MixerError::Closed)));
    }
}
