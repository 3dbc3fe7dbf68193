//! Channel-based sample mixing.
//!
//! This crate mixes named, pre-decoded samples through a small graph of
//! volume stages:
//!
//! - `channels`: the mixer root ([`Channels`]) with the master bus
//! - `channel`: named mixing points, polyphonic or monophonic
//! - `playing`: handles to active sounds ([`PlayingSound`])
//! - `volume`: volume, mute and fade control shared by all three levels
//! - `graph`: the rendering capability ([`AudioContext`]) and a software
//!   renderer ([`RenderContext`])
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chanmix::{ChannelOptions, Channels, PlayOptions, RenderContext, Sample, SampleBank};
//! use chanmix::pcm::Format;
//!
//! let ctx = RenderContext::new(Format::MONO_16K);
//! let bank = Arc::new(SampleBank::new());
//! bank.insert(Sample::sine("beep", Format::MONO_16K, 880.0, Duration::from_millis(200), 0.5));
//!
//! let mixer = Channels::new(ctx.clone(), bank);
//! let fx = mixer.create_channel("fx", ChannelOptions::monophonic()).unwrap();
//! let beep = fx.play("beep", PlayOptions::new()).unwrap();
//!
//! // Render 250ms, then let the mixer notice the sound has ended.
//! ctx.advance(Duration::from_millis(250));
//! mixer.update();
//! assert!(beep.is_stopped());
//! ```

pub mod channel;
pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod pcm;
pub mod playing;
pub mod sample;
mod timeline;
pub mod volume;

pub use channel::{Channel, ChannelKind, ChannelOptions, ChannelRef, PlayOptions, StopOptions, StreamInput};
pub use channels::Channels;
pub use config::{ChannelConfig, MixerConfig};
pub use error::{MixerError, Result};
pub use events::{EventBus, EventKind, ListenerId, MixerEvent, VolumeTarget};
pub use graph::{AudioContext, Effect, Levels, NodeId, Pcm16Stream, RenderContext, StreamSource};
pub use playing::{PlayingSound, SoundId};
pub use sample::{LoadProgress, Pcm16Loader, Sample, SampleBank, SampleLoader, SampleRegistry};
pub use timeline::FadeCallback;
pub use volume::VolumeNodes;
