//! Error types for the mixer.

use std::io;

use thiserror::Error;

use crate::playing::SoundId;

/// Error type for mixer operations.
#[derive(Error, Debug)]
pub enum MixerError {
    /// A value outside its allowed range (negative volume, blank name, ...).
    #[error("mixer: invalid argument: {0}")]
    InvalidArgument(String),

    /// A channel with this name already exists.
    #[error("mixer: duplicate channel: {0:?}")]
    DuplicateChannel(String),

    /// No channel matches the selector.
    #[error("mixer: channel not found: {0:?}")]
    ChannelNotFound(String),

    /// No sample with this name is registered.
    #[error("mixer: sample not found: {0:?}")]
    SampleNotFound(String),

    /// A playing sound was removed while not registered.
    ///
    /// Unreachable through the public API; seeing it means a lifecycle bug.
    #[error("mixer: playing sound {0} is not registered")]
    NotRegistered(SoundId),

    /// The mixer owning a channel or sound has been dropped.
    #[error("mixer: closed")]
    Closed,

    /// A sample loader failed.
    #[error("mixer: failed to load sample {name:?}: {source}")]
    SampleLoad {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Configuration could not be parsed.
    #[error("mixer: config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for mixer operations.
pub type Result<T> = std::result::Result<T, MixerError>;
