//! Declarative mixer setup, loaded from YAML.
//!
//! ```yaml
//! master_volume: 0.8
//! channels:
//!   - name: music
//!     volume: 0.5
//!     looping: true
//!   - name: fx
//!     kind: monophonic
//!     stop_fade_ms: 20
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelKind, ChannelOptions, PlayOptions, StopOptions};
use crate::channels::Channels;
use crate::error::Result;
use crate::graph::AudioContext;
use crate::sample::SampleRegistry;

fn default_volume() -> f32 {
    1.0
}

fn is_default_volume(v: &f32) -> bool {
    *v == 1.0
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Mixer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerConfig {
    #[serde(default = "default_volume", skip_serializing_if = "is_default_volume")]
    pub master_volume: f32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub master_muted: bool,

    /// Channels, created in this order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            master_muted: false,
            channels: Vec::new(),
        }
    }
}

/// One channel entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,

    #[serde(default)]
    pub kind: ChannelKind,

    #[serde(default = "default_volume", skip_serializing_if = "is_default_volume")]
    pub volume: f32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub muted: bool,

    /// Default looping for sounds played on the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,

    /// Default fade-out before a sound's natural end, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out_ms: Option<u64>,

    /// Fade applied by `Channel::stop_all`, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_fade_ms: Option<u64>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::default(),
            volume: 1.0,
            muted: false,
            looping: None,
            fade_out_ms: None,
            stop_fade_ms: None,
        }
    }

    /// Channel options described by this entry.
    pub fn options(&self) -> ChannelOptions {
        ChannelOptions {
            kind: self.kind,
            play: PlayOptions {
                looping: self.looping,
                fade_out: self.fade_out_ms.map(Duration::from_millis),
                ..PlayOptions::default()
            },
            stop: StopOptions {
                fade_out: self.stop_fade_ms.map(Duration::from_millis),
            },
            effect: None,
        }
    }
}

impl MixerConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Channels {
    /// Builds a mixer with the configured master state and channels.
    pub fn from_config(
        ctx: Arc<dyn AudioContext>,
        samples: Arc<dyn SampleRegistry>,
        config: &MixerConfig,
    ) -> Result<Self> {
        let mixer = Channels::new(ctx, samples);
        mixer.master().set_volume(config.master_volume)?;
        mixer.master().set_muted(config.master_muted);
        for entry in &config.channels {
            let channel = mixer.create_channel(&entry.name, entry.options())?;
            channel.set_volume(entry.volume)?;
            channel.set_muted(entry.muted);
        }
        tracing::debug!(channels = config.channels.len(), "mixer configured");
        Ok(mixer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MixerError;
    use crate::graph::RenderContext;
    use crate::pcm::Format;
    use crate::sample::SampleBank;
    use std::io::Write;

    const SAMPLE: &str = r#"
master_volume: 0.8
channels:
  - name: music
    volume: 0.5
    looping: true
  - name: fx
    kind: monophonic
    fade_out_ms: 50
    stop_fade_ms: 20
"#;

    #[test]
    fn test_parse_defaults() {
        let config = MixerConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.master_volume, 0.8);
        assert!(!config.master_muted);
        assert_eq!(config.channels.len(), 2);

        let music = &config.channels[0];
        assert_eq!(music.kind, ChannelKind::Polyphonic);
        assert_eq!(music.looping, Some(true));
        assert_eq!(music.fade_out_ms, None);

        let fx = &config.channels[1];
        assert_eq!(fx.kind, ChannelKind::Monophonic);
        assert_eq!(fx.volume, 1.0);
        assert_eq!(fx.options().stop.fade_out, Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_empty_document() {
        let config = MixerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, MixerConfig::default());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = MixerConfig::from_yaml("channels:\n  - name: x\n    kind: stereo\n").unwrap_err();
        assert!(matches!(err, MixerError::Config(_)));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = MixerConfig::from_yaml(SAMPLE).unwrap();
        let again = MixerConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = MixerConfig::load(file.path()).unwrap();
        assert_eq!(config.channels[0].name, "music");

        assert!(matches!(
            MixerConfig::load(file.path().with_extension("missing")),
            Err(MixerError::Io(_))
        ));
    }

    #[test]
    fn test_from_config_applies() {
        let config = MixerConfig::from_yaml(SAMPLE).unwrap();
        let mixer = Channels::from_config(
            RenderContext::new(Format::mono(8000)),
            Arc::new(SampleBank::new()),
            &config,
        )
        .unwrap();

        assert_eq!(mixer.master().volume(), 0.8);
        let names: Vec<_> = mixer.channels().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["music", "fx"]);
        let music = mixer.channel("music").unwrap();
        assert_eq!(music.volume(), 0.5);
        assert_eq!(music.play_defaults().looping, Some(true));
        assert!(mixer.channel("fx").unwrap().is_monophonic());
    }

    #[test]
    fn test_from_config_rejects_bad_volume() {
        let mut config = MixerConfig::default();
        let mut entry = ChannelConfig::new("music");
        entry.volume = -1.0;
        config.channels.push(entry);
        let result = Channels::from_config(
            RenderContext::new(Format::mono(8000)),
            Arc::new(SampleBank::new()),
            &config,
        );
        assert!(matches!(result, Err(MixerError::InvalidArgument(_))));
    }
}
