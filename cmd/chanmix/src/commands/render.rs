//! Offline rendering.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;

use chanmix::graph::BLOCK_FRAMES;
use chanmix::pcm::{Format, encode_pcm16};
use chanmix::{ChannelRef, Channels, PlayOptions, RenderContext, Sample, SampleBank};

use super::load_config;
use crate::Cli;

const TONE_AMPLITUDE: f32 = 0.5;

/// Renders a mix of synthesized tones.
#[derive(Args)]
pub struct RenderCommand {
    /// Tone sample to register, as name=freq_hz:duration_ms (repeatable)
    #[arg(long = "tone", value_name = "NAME=FREQ:MS")]
    tones: Vec<ToneSpec>,

    /// Sound to play, as sample[@channel][:loop] (repeatable)
    #[arg(long = "play", value_name = "SAMPLE[@CHANNEL][:loop]")]
    plays: Vec<PlaySpec>,

    /// Length of the rendered mix in seconds
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    /// Output sample rate
    #[arg(long, default_value_t = 16000)]
    sample_rate: u32,

    /// Render stereo instead of mono
    #[arg(long)]
    stereo: bool,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<String>,
}

impl RenderCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let length = render_length(self.seconds)?;
        if self.sample_rate == 0 {
            bail!("--sample-rate must be positive");
        }
        let format = if self.stereo {
            Format::stereo(self.sample_rate)
        } else {
            Format::mono(self.sample_rate)
        };

        let bank = Arc::new(SampleBank::new());
        for tone in &self.tones {
            bank.insert(Sample::sine(
                tone.name.clone(),
                format,
                tone.freq,
                tone.duration,
                TONE_AMPLITUDE,
            ));
        }

        let config = load_config(cli)?;
        let ctx = RenderContext::new(format);
        let mixer = Channels::from_config(ctx.clone(), bank, &config)?;
        mixer.resume().await;

        for play in &self.plays {
            let mut options = PlayOptions::new();
            if let Some(channel) = &play.channel {
                options = options.on(ChannelRef::from(channel.as_str()));
            }
            if play.looping {
                options = options.looping(true);
            }
            mixer
                .play(&play.sample, options)
                .with_context(|| format!("failed to play {}", play.sample))?;
        }

        let mut out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("failed to create {path}"))?,
            )),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };

        let total = format.frames_in(length) as usize;
        let mut samples = vec![0.0f32; BLOCK_FRAMES * format.channels()];
        let mut bytes = vec![0u8; BLOCK_FRAMES * format.frame_bytes()];
        let mut done = 0;
        while done < total {
            let frames = (total - done).min(BLOCK_FRAMES);
            let block = &mut samples[..frames * format.channels()];
            ctx.render(block);
            mixer.update();
            let n = encode_pcm16(block, &mut bytes);
            out.write_all(&bytes[..n])?;
            done += frames;
        }
        out.flush()?;

        tracing::info!(
            frames = total,
            %format,
            still_playing = mixer.playing_sounds().len(),
            "render finished"
        );
        Ok(())
    }
}

/// Converts `--seconds`, rejecting negative, non-finite and overlong values.
fn render_length(seconds: f64) -> anyhow::Result<Duration> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(length) => Ok(length),
        Err(e) => bail!("--seconds {seconds} is out of range: {e}"),
    }
}

/// `name=freq:ms`
#[derive(Debug, Clone, PartialEq)]
struct ToneSpec {
    name: String,
    freq: f64,
    duration: Duration,
}

impl FromStr for ToneSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("tone {s:?}: expected name=freq:ms"))?;
        let (freq, ms) = rest
            .split_once(':')
            .ok_or_else(|| format!("tone {s:?}: expected name=freq:ms"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("tone {s:?}: empty name"));
        }
        let freq: f64 = freq
            .trim()
            .parse()
            .map_err(|e| format!("tone {s:?}: bad frequency: {e}"))?;
        let ms: u64 = ms
            .trim()
            .parse()
            .map_err(|e| format!("tone {s:?}: bad duration: {e}"))?;
        Ok(Self {
            name: name.to_string(),
            freq,
            duration: Duration::from_millis(ms),
        })
    }
}

/// `sample[@channel][:loop]`
#[derive(Debug, Clone, PartialEq)]
struct PlaySpec {
    sample: String,
    channel: Option<String>,
    looping: bool,
}

impl FromStr for PlaySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, looping) = match s.strip_suffix(":loop") {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (sample, channel) = match rest.split_once('@') {
            Some((sample, channel)) => (sample, Some(channel.to_string())),
            None => (rest, None),
        };
        if sample.is_empty() {
            return Err(format!("play {s:?}: empty sample name"));
        }
        Ok(Self {
            sample: sample.to_string(),
            channel,
            looping,
        })
    }
}
