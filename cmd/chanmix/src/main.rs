//! chanmix - render mixes offline and validate mixer configs.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{CheckCommand, RenderCommand};

/// chanmix - channel-based sample mixer.
///
/// Channels, their volumes and play defaults come from a YAML config;
/// tones are synthesized on the command line and rendered to raw PCM16 LE.
#[derive(Parser)]
#[command(name = "chanmix")]
#[command(about = "Channel-based sample mixer")]
#[command(version)]
pub struct Cli {
    /// Mixer config file (YAML)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a mix to raw PCM16 LE
    Render(RenderCommand),
    /// Load a config and print the resulting channels
    Check(CheckCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may carry audio.
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Render(cmd) => cmd.run(&cli).await,
        Commands::Check(cmd) => cmd.run(&cli),
    }
}
