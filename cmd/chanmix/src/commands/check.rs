//! Config validation.

use std::sync::Arc;

use clap::Args;
use serde_json::json;

use chanmix::pcm::Format;
use chanmix::{Channels, RenderContext, SampleBank};

use super::load_config;
use crate::Cli;

/// Applies a config to a scratch mixer and prints the outcome as JSON.
#[derive(Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = load_config(cli)?;
        let mixer = Channels::from_config(
            RenderContext::new(Format::default()),
            Arc::new(SampleBank::new()),
            &config,
        )?;

        let channels: Vec<_> = mixer
            .channels()
            .iter()
            .map(|c| {
                json!({
                    "name": c.name(),
                    "kind": c.kind(),
                    "volume": c.volume(),
                    "muted": c.is_muted(),
                    "looping": c.play_defaults().looping,
                    "fade_out_ms": c.play_defaults().fade_out.map(|d| d.as_millis() as u64),
                    "stop_fade_ms": c.stop_defaults().fade_out.map(|d| d.as_millis() as u64),
                })
            })
            .collect();
        let report = json!({
            "master": {
                "volume": mixer.master().volume(),
                "muted": mixer.master().is_muted(),
            },
            "channels": channels,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
