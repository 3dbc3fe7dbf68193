//! Named mixing points.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::{Channels, MixerShared};
use crate::error::{MixerError, Result};
use crate::graph::{AudioContext, Effect, Levels, NodeId, StreamSource};
use crate::playing::PlayingSound;
use crate::timeline::FadeCallback;
use crate::volume::VolumeNodes;

/// Playback mode of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Any number of simultaneous sounds.
    #[default]
    Polyphonic,
    /// Starting a sound stops whatever the channel was playing.
    Monophonic,
}

/// Selects where to play or what to stop.
#[derive(Debug, Clone, Default)]
pub enum ChannelRef {
    /// The master bus, bypassing every channel.
    #[default]
    Master,
    Name(String),
    Channel(Channel),
}

impl From<&str> for ChannelRef {
    fn from(name: &str) -> Self {
        ChannelRef::Name(name.to_string())
    }
}

impl From<String> for ChannelRef {
    fn from(name: String) -> Self {
        ChannelRef::Name(name)
    }
}

impl From<Channel> for ChannelRef {
    fn from(channel: Channel) -> Self {
        ChannelRef::Channel(channel)
    }
}

impl From<&Channel> for ChannelRef {
    fn from(channel: &Channel) -> Self {
        ChannelRef::Channel(channel.clone())
    }
}

/// Options for [`Channels::play`].
///
/// Unset fields fall back to the target channel's defaults, then to
/// one-shot playback at full volume.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub channel: ChannelRef,
    pub looping: Option<bool>,
    /// Fade to silence over this span before the natural end.
    pub fade_out: Option<Duration>,
    pub volume: Option<f32>,
}

impl PlayOptions {
    /// Plays on master, one-shot, with channel defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target channel.
    pub fn on(mut self, channel: impl Into<ChannelRef>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets whether the sample repeats.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Sets the fade-out before the natural end.
    pub fn fade_out(mut self, fade: Duration) -> Self {
        self.fade_out = Some(fade);
        self
    }

    /// Sets the starting volume of the sound.
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// How to stop sounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Fade out over this span before stopping; immediate when unset.
    pub fade_out: Option<Duration>,
}

impl StopOptions {
    /// Stops without fading.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Fades out over `fade`, then stops.
    pub fn faded(fade: Duration) -> Self {
        Self { fade_out: Some(fade) }
    }
}

/// Options for [`Channels::create_channel`].
#[derive(Default)]
pub struct ChannelOptions {
    pub kind: ChannelKind,
    /// Defaults for sounds played on this channel. `channel` is ignored.
    pub play: PlayOptions,
    /// Used by [`Channel::stop_all`].
    pub stop: StopOptions,
    /// Processing inserted at the channel input, ahead of the volume stages.
    pub effect: Option<Box<dyn Effect>>,
}

impl ChannelOptions {
    /// Creates options for a channel of `kind`.
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Creates options for a monophonic channel.
    pub fn monophonic() -> Self {
        Self::new(ChannelKind::Monophonic)
    }

    /// Sets the play defaults.
    pub fn with_play(mut self, play: PlayOptions) -> Self {
        self.play = play;
        self
    }

    /// Sets the stop defaults.
    pub fn with_stop(mut self, stop: StopOptions) -> Self {
        self.stop = stop;
        self
    }

    /// Inserts `effect` at the channel input.
    pub fn with_effect(mut self, effect: impl Effect + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

impl fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("kind", &self.kind)
            .field("play", &self.play)
            .field("stop", &self.stop)
            .field("effect", &self.effect.is_some())
            .finish()
    }
}

struct ChannelShared {
    name: String,
    kind: ChannelKind,
    volume: VolumeNodes,
    effect: Option<NodeId>,
    play_defaults: PlayOptions,
    stop_defaults: StopOptions,
    ctx: Arc<dyn AudioContext>,
    mixer: Weak<MixerShared>,
}

/// Handle to a channel. Clones refer to the same channel.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
}

impl Channel {
    /// Wires effect (if any) -> volume stages -> `output`.
    pub(crate) fn new(
        mixer: &Arc<MixerShared>,
        name: String,
        volume: VolumeNodes,
        mut options: ChannelOptions,
    ) -> Self {
        let ctx = mixer.ctx.clone();
        let effect = options.effect.take().map(|fx| {
            let node = ctx.create_effect(fx);
            ctx.connect(node, volume.input());
            node
        });
        // Channel defaults never carry a target.
        options.play.channel = ChannelRef::Master;
        Self {
            shared: Arc::new(ChannelShared {
                name,
                kind: options.kind,
                volume,
                effect,
                play_defaults: options.play,
                stop_defaults: options.stop,
                ctx,
                mixer: Arc::downgrade(mixer),
            }),
        }
    }

    /// Returns the channel name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the playback mode.
    pub fn kind(&self) -> ChannelKind {
        self.shared.kind
    }

    /// Returns true if starting a sound stops the others.
    pub fn is_monophonic(&self) -> bool {
        self.shared.kind == ChannelKind::Monophonic
    }

    /// Returns the defaults applied to unset play options.
    pub fn play_defaults(&self) -> &PlayOptions {
        &self.shared.play_defaults
    }

    /// Returns the options used by [`stop_all`](Self::stop_all).
    pub fn stop_defaults(&self) -> StopOptions {
        self.shared.stop_defaults
    }

    /// Node sounds on this channel connect to.
    pub(crate) fn input(&self) -> NodeId {
        self.shared.effect.unwrap_or_else(|| self.shared.volume.input())
    }

    pub(crate) fn volume_nodes(&self) -> &VolumeNodes {
        &self.shared.volume
    }

    pub(crate) fn belongs_to(&self, mixer: &Arc<MixerShared>) -> bool {
        std::ptr::eq(self.shared.mixer.as_ptr(), Arc::as_ptr(mixer))
    }

    pub(crate) fn release(&self) {
        if let Some(node) = self.shared.effect {
            self.shared.ctx.release(node);
        }
        self.shared.volume.release();
    }

    fn mixer(&self) -> Result<Channels> {
        self.shared
            .mixer
            .upgrade()
            .map(Channels::from_shared)
            .ok_or(MixerError::Closed)
    }

    /// Plays a sample on this channel. The target in `options` is replaced.
    pub fn play(&self, sample: &str, options: PlayOptions) -> Result<PlayingSound> {
        self.mixer()?.play(sample, options.on(self))
    }

    /// Stops every sound on this channel using the channel's stop defaults.
    pub fn stop_all(&self) -> Result<()> {
        self.mixer()?
            .stop_all_with(Some(ChannelRef::from(self)), self.shared.stop_defaults)
    }

    /// Sounds currently registered on this channel, in play order.
    pub fn playing_sounds(&self) -> Result<Vec<PlayingSound>> {
        Ok(self
            .mixer()?
            .playing_sounds()
            .into_iter()
            .filter(|s| s.channel().is_some_and(|c| c == self))
            .collect())
    }

    /// Feeds a live stream into the channel input until the returned handle
    /// is dropped or disconnected.
    pub fn connect_stream(&self, source: impl StreamSource + 'static) -> StreamInput {
        let ctx = self.shared.ctx.clone();
        let node = ctx.create_stream_source(Box::new(source));
        ctx.connect(node, self.input());
        tracing::debug!(channel = %self.shared.name, node = node.raw(), "stream connected");
        StreamInput { ctx, node }
    }

    /// Returns the channel volume stage.
    pub fn volume(&self) -> f32 {
        self.shared.volume.volume()
    }

    /// Sets the channel volume stage.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.shared.volume.set_volume(volume)
    }

    /// Returns the current fade envelope value.
    pub fn fade_volume(&self) -> f32 {
        self.shared.volume.fade_volume()
    }

    /// Returns true while the volume stage is 0.
    pub fn is_muted(&self) -> bool {
        self.shared.volume.is_muted()
    }

    /// Mutes the channel, remembering its volume.
    pub fn mute(&self) {
        self.shared.volume.mute();
    }

    /// Restores the volume held before muting.
    pub fn unmute(&self) {
        self.shared.volume.unmute();
    }

    /// Mutes or unmutes.
    pub fn set_muted(&self, muted: bool) {
        self.shared.volume.set_muted(muted);
    }

    /// Returns true while a fade completion is pending.
    pub fn is_fading(&self) -> bool {
        self.shared.volume.is_fading()
    }

    /// Ramps the fade envelope to `target` (0..=1).
    pub fn fade_to(&self, target: f32, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.shared.volume.fade_to(target, duration, on_complete)
    }

    /// Fades the envelope up to 1.
    pub fn fade_in(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.shared.volume.fade_in(duration, on_complete)
    }

    /// Fades the envelope down to 0. Sounds keep playing.
    pub fn fade_out(&self, duration: Duration, on_complete: Option<FadeCallback>) -> Result<()> {
        self.shared.volume.fade_out(duration, on_complete)
    }

    /// Freezes the envelope and drops the pending completion.
    pub fn cancel_fade(&self) {
        self.shared.volume.cancel_fade();
    }

    /// Peak and RMS of the channel's post-fade output.
    pub fn levels(&self) -> Levels {
        self.shared.volume.levels()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .field("volume", &self.shared.volume)
            .finish()
    }
}

/// A live stream connected to a channel.
///
/// The stream is stopped and removed from the graph on drop.
pub struct StreamInput {
    ctx: Arc<dyn AudioContext>,
    node: NodeId,
}

impl StreamInput {
    /// Returns the stream's node in the graph.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Stops the stream and removes it from the channel.
    pub fn disconnect(self) {}
}

impl Drop for StreamInput {
    fn drop(&mut self) {
        self.ctx.stop_source(self.node);
        self.ctx.release(self.node);
    }
}

impl fmt::Debug for StreamInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamInput").field("node", &self.node).finish()
    }
}
