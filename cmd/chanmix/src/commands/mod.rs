//! CLI commands module.

mod check;
mod render;

pub use check::CheckCommand;
pub use render::RenderCommand;

use anyhow::Context;
use chanmix::MixerConfig;

use crate::Cli;

/// Loads the `--config` file, or an empty config when none is given.
pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<MixerConfig> {
    match cli.config.as_deref() {
        Some(path) => MixerConfig::load(path).with_context(|| format!("failed to load config {path}")),
        None => Ok(MixerConfig::default()),
    }
}
