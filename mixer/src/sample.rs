//! Decoded samples and the registry the mixer resolves them from.
//!
//! Decoding is not done here: loaders hand over already-decoded audio (or raw
//! PCM16, which is trivially converted). The mixer only ever looks samples up
//! by name through [`SampleRegistry`].

use std::collections::HashMap;
use std::f64::consts::PI;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::{MixerError, Result};
use crate::pcm::{Format, decode_pcm16};

/// An immutable, decoded sound.
#[derive(Debug, Clone)]
pub struct Sample {
    name: String,
    format: Format,
    /// Interleaved frames.
    data: Arc<[f32]>,
}

impl Sample {
    /// Creates a sample from interleaved f32 data.
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    pub fn new(name: impl Into<String>, format: Format, mut data: Vec<f32>) -> Self {
        let whole = data.len() - data.len() % format.channels();
        data.truncate(whole);
        Self {
            name: name.into(),
            format,
            data: data.into(),
        }
    }

    /// Creates a sample from little-endian PCM16 bytes.
    pub fn from_pcm16(name: impl Into<String>, format: Format, bytes: &[u8]) -> Self {
        Self::new(name, format, decode_pcm16(bytes))
    }

    /// Generates a sine tone at `amplitude` (0..=1).
    pub fn sine(
        name: impl Into<String>,
        format: Format,
        freq: f64,
        duration: Duration,
        amplitude: f32,
    ) -> Self {
        let frames = format.frames_in(duration) as usize;
        let channels = format.channels();
        let mut data = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f64 / format.sample_rate as f64;
            let value = (2.0 * PI * freq * t).sin() as f32 * amplitude;
            for _ in 0..channels {
                data.push(value);
            }
        }
        Self::new(name, format, data)
    }

    /// Creates a sample holding a constant value, mostly useful for level checks.
    pub fn constant(name: impl Into<String>, format: Format, value: f32, duration: Duration) -> Self {
        let len = format.frames_in(duration) as usize * format.channels();
        Self::new(name, format, vec![value; len])
    }

    /// Returns the unique name of the sample.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the format of the sample data.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.format.channels()
    }

    /// Returns the playback duration.
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frames() as u64)
    }

    /// Returns the value of `channel` at `frame`, mapped onto a layout with
    /// `out_channels` channels.
    ///
    /// Mono is duplicated onto stereo; stereo is averaged down to mono.
    #[inline]
    pub(crate) fn value(&self, frame: usize, channel: usize, out_channels: usize) -> f32 {
        let channels = self.format.channels();
        let base = frame * channels;
        if channels == out_channels {
            self.data[base + channel]
        } else if channels == 1 {
            self.data[base]
        } else {
            (self.data[base] + self.data[base + 1]) * 0.5
        }
    }
}

/// Source of samples by name.
pub trait SampleRegistry: Send + Sync {
    /// Returns the sample with the given name, if loaded.
    fn sample_by_name(&self, name: &str) -> Option<Arc<Sample>>;
}

/// Produces one decoded sample.
pub trait SampleLoader: Send {
    /// Name the loaded sample will be registered under.
    fn name(&self) -> &str;

    /// Loads and decodes the sample.
    fn load(self: Box<Self>) -> std::io::Result<Sample>;
}

/// Loads raw little-endian PCM16 from any reader.
pub struct Pcm16Loader<R> {
    name: String,
    format: Format,
    reader: R,
}

impl<R: Read + Send> Pcm16Loader<R> {
    pub fn new(name: impl Into<String>, format: Format, reader: R) -> Self {
        Self {
            name: name.into(),
            format,
            reader,
        }
    }
}

impl<R: Read + Send> SampleLoader for Pcm16Loader<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(mut self: Box<Self>) -> std::io::Result<Sample> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(Sample::from_pcm16(self.name, self.format, &bytes))
    }
}

/// Progress report emitted by [`SampleBank::load_all`] after each sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProgress {
    /// Number of samples loaded so far.
    pub loaded: usize,
    /// Number of samples requested.
    pub total: usize,
    /// Name of the sample just loaded.
    pub name: String,
}

impl LoadProgress {
    /// Returns the completed fraction in [0, 1].
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.loaded as f32 / self.total as f32
        }
    }
}

/// In-memory sample registry.
#[derive(Default)]
pub struct SampleBank {
    samples: RwLock<HashMap<String, Arc<Sample>>>,
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sample, returning the one it replaced.
    pub fn insert(&self, sample: Sample) -> Option<Arc<Sample>> {
        let name = sample.name().to_string();
        self.samples.write().insert(name, Arc::new(sample))
    }

    /// Removes a sample. Sounds already playing it keep their reference.
    pub fn remove(&self, name: &str) -> Option<Arc<Sample>> {
        self.samples.write().remove(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.samples.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Runs every loader in order, registering each result.
    ///
    /// Stops at the first failure; samples loaded before it stay registered.
    pub fn load_all(
        &self,
        loaders: Vec<Box<dyn SampleLoader>>,
        mut on_progress: impl FnMut(LoadProgress),
    ) -> Result<()> {
        let total = loaders.len();
        for (i, loader) in loaders.into_iter().enumerate() {
            let name = loader.name().to_string();
            let sample = loader.load().map_err(|source| MixerError::SampleLoad {
                name: name.clone(),
                source,
            })?;
            self.insert(sample);
            tracing::debug!(sample = %name, loaded = i + 1, total, "sample loaded");
            on_progress(LoadProgress {
                loaded: i + 1,
                total,
                name,
            });
        }
        Ok(())
    }
}

impl SampleRegistry for SampleBank {
    fn sample_by_name(&self, name: &str) -> Option<Arc<Sample>> {
        self.samples.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingLoader;

    impl SampleLoader for FailingLoader {
        fn name(&self) -> &str {
            "broken"
        }

        fn load(self: Box<Self>) -> io::Result<Sample> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad header"))
        }
    }

    #[test]
    fn test_sample_duration() {
        let sample = Sample::constant("c", Format::stereo(8000), 0.5, Duration::from_millis(250));
        assert_eq!(sample.frames(), 2000);
        assert_eq!(sample.data().len(), 4000);
        assert_eq!(sample.duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_frame_dropped() {
        let sample = Sample::new("odd", Format::stereo(8000), vec![0.1, 0.2, 0.3]);
        assert_eq!(sample.frames(), 1);
    }

    #[test]
    fn test_channel_mapping() {
        let stereo = Sample::new("s", Format::stereo(8000), vec![0.2, 0.6]);
        assert_eq!(stereo.value(0, 1, 2), 0.6);
        assert!((stereo.value(0, 0, 1) - 0.4).abs() < 1e-6);

        let mono = Sample::new("m", Format::mono(8000), vec![0.3]);
        assert_eq!(mono.value(0, 1, 2), 0.3);
    }

    #[test]
    fn test_sine_starts_at_zero() {
        let sample = Sample::sine("a440", Format::MONO_16K, 440.0, Duration::from_millis(10), 0.5);
        assert_eq!(sample.frames(), 160);
        assert_eq!(sample.data()[0], 0.0);
        assert!(sample.data().iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn test_load_all_reports_progress() {
        let bank = SampleBank::new();
        let pcm: Vec<u8> = [1000i16, -1000, 2000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let loaders: Vec<Box<dyn SampleLoader>> = vec![
            Box::new(Pcm16Loader::new("a", Format::mono(8000), io::Cursor::new(pcm.clone()))),
            Box::new(Pcm16Loader::new("b", Format::mono(8000), io::Cursor::new(pcm))),
        ];

        let mut reports = Vec::new();
        bank.load_all(loaders, |p| reports.push(p)).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].loaded, 2);
        assert_eq!(reports[1].fraction(), 1.0);
        assert_eq!(bank.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(bank.sample_by_name("a").unwrap().frames(), 3);
    }

    #[test]
    fn test_load_all_stops_at_failure() {
        let bank = SampleBank::new();
        let loaders: Vec<Box<dyn SampleLoader>> = vec![
            Box::new(Pcm16Loader::new("ok", Format::mono(8000), io::Cursor::new(vec![0u8; 4]))),
            Box::new(FailingLoader),
            Box::new(Pcm16Loader::new("never", Format::mono(8000), io::Cursor::new(vec![0u8; 4]))),
        ];

        let err = bank.load_all(loaders, |_| {}).unwrap_err();
        assert!(matches!(err, MixerError::SampleLoad { ref name, .. } if name == "broken"));
        assert_eq!(bank.names(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_insert_replaces() {
        let bank = SampleBank::new();
        assert!(bank.insert(Sample::constant("x", Format::MONO_16K, 0.1, Duration::from_millis(1))).is_none());
        let old = bank.insert(Sample::constant("x", Format::MONO_16K, 0.2, Duration::from_millis(1)));
        assert_eq!(old.unwrap().data()[0], 0.1);
        assert_eq!(bank.len(), 1);
    }
}
