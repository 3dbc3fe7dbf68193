//! Audio format of rendered and sampled audio.

use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Describes a frame layout: sample rate plus mono or stereo channels.
///
/// Frames are interleaved; one frame holds one sample per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    /// Sample rate in Hz (e.g., 16000, 48000).
    pub sample_rate: u32,
    /// True for stereo (2 channels), false for mono (1 channel).
    pub stereo: bool,
}

impl Format {
    /// Creates a mono format with the given sample rate.
    pub const fn mono(sample_rate: u32) -> Self {
        Self { sample_rate, stereo: false }
    }

    /// Creates a stereo format with the given sample rate.
    pub const fn stereo(sample_rate: u32) -> Self {
        Self { sample_rate, stereo: true }
    }

    /// Returns the number of channels (1 for mono, 2 for stereo).
    pub fn channels(&self) -> usize {
        if self.stereo { 2 } else { 1 }
    }

    /// Returns the number of PCM16 bytes per frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels() * 2
    }

    /// Returns the number of whole frames that fit in `duration`.
    pub fn frames_in(&self, duration: Duration) -> u64 {
        (duration.as_nanos() * self.sample_rate as u128 / NANOS_PER_SEC) as u64
    }

    /// Returns the playback duration of `frames` frames.
    pub fn duration_of(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = frames as u128 * NANOS_PER_SEC / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Returns the number of PCM16 bytes needed for `duration`.
    pub fn bytes_in(&self, duration: Duration) -> usize {
        self.frames_in(duration) as usize * self.frame_bytes()
    }
}

impl Format {
    /// 16kHz mono
    pub const MONO_16K: Format = Format::mono(16000);
    /// 44.1kHz mono
    pub const MONO_44K: Format = Format::mono(44100);
    /// 48kHz mono
    pub const MONO_48K: Format = Format::mono(48000);
    /// 44.1kHz stereo
    pub const STEREO_44K: Format = Format::stereo(44100);
    /// 48kHz stereo
    pub const STEREO_48K: Format = Format::stereo(48000);
}

impl Default for Format {
    fn default() -> Self {
        Format::STEREO_48K
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = if self.stereo { "stereo" } else { "mono" };
        write!(f, "{}Hz {}", self.sample_rate, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_channels() {
        assert_eq!(Format::mono(16000).channels(), 1);
        assert_eq!(Format::stereo(48000).channels(), 2);
        assert_eq!(Format::stereo(48000).frame_bytes(), 4);
    }

    #[test]
    fn test_frames_and_duration() {
        let format = Format::mono(8000);
        assert_eq!(format.frames_in(Duration::from_millis(100)), 800);
        assert_eq!(format.duration_of(800), Duration::from_millis(100));
        // 1 frame at 8kHz is exactly 125us.
        assert_eq!(format.duration_of(1), Duration::from_micros(125));
    }

    #[test]
    fn test_bytes_in() {
        assert_eq!(Format::MONO_16K.bytes_in(Duration::from_secs(1)), 32000);
        assert_eq!(Format::STEREO_48K.bytes_in(Duration::from_millis(10)), 1920);
    }

    #[test]
    fn test_display() {
        assert_eq!(Format::MONO_16K.to_string(), "16000Hz mono");
    }
}
