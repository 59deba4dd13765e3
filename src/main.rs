use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clip_audio::{Clip, ClipOptions, OutputMode, Player, PlayerConfig, SoundEffect};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "clipdeck")]
#[command(about = "Play, pause, resume and loop audio clips", long_about = None)]
struct Cli {
    /// JSON player configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render without an output device
    #[arg(long)]
    headless: bool,

    /// Base URL for locators that are not local files
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a clip and control it with commands read from stdin
    Play {
        /// File path or URL of the clip
        locator: String,

        /// Loop the clip
        #[arg(short = 'l', long = "loop")]
        looping: bool,

        /// Wait for a `play` command instead of starting once decoded
        #[arg(long)]
        no_autoplay: bool,
    },
    /// Trigger a sound effect repeatedly, letting instances overlap
    Sfx {
        /// File path or URL of the sound
        locator: String,

        /// How many times to trigger it
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Milliseconds between triggers
        #[arg(short, long, default_value = "250")]
        interval_ms: u64,
    },
}

/// A line typed at the `play` prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Pause,
    Stop,
    Status,
    Sfx,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "play" | "resume" | "p" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "stop" | "s" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "sfx" => Ok(Command::Sfx),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipdeck=info,clip_audio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let mut player = Player::new(config).context("Failed to start audio output")?;
    info!(sample_rate = player.sample_rate(), "player ready");

    let result = match cli.command {
        Commands::Play {
            locator,
            looping,
            no_autoplay,
        } => {
            let options = ClipOptions {
                autoplay: !no_autoplay,
                looping,
            };
            run_interactive(&player, &locator, options).await
        }
        Commands::Sfx {
            locator,
            count,
            interval_ms,
        } => run_sfx(&player, &locator, count, Duration::from_millis(interval_ms)).await,
    };

    player.shutdown().context("Failed to stop audio output")?;
    result
}

/// Configuration file first, then command-line overrides
fn build_config(cli: &Cli) -> Result<PlayerConfig> {
    let mut config = match &cli.config {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    if cli.headless {
        config.output = OutputMode::Headless;
    }
    if let Some(url) = &cli.base_url {
        config.base_url = Some(url.clone());
    }
    if config.headless_sample_rate == 0 {
        bail!("headless_sample_rate must be greater than zero");
    }

    Ok(config)
}

async fn run_interactive(player: &Player, locator: &str, options: ClipOptions) -> Result<()> {
    let clip = player.load_clip(locator, options);
    clip.wait_ready()
        .await
        .with_context(|| format!("Failed to load {}", locator))?;

    let sfx = clip.sound_effect();
    info!(
        clip = clip.label(),
        duration = clip.duration().unwrap_or_default(),
        looping = clip.is_looping(),
        "clip loaded"
    );
    eprintln!("Commands: play, pause, stop, status, sfx, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => apply(&clip, &sfx, command)?,
            Err(e) => warn!("{}", e),
        }
    }

    clip.stop();
    Ok(())
}

fn apply(clip: &Clip, sfx: &SoundEffect, command: Command) -> Result<()> {
    match command {
        Command::Play => clip.play(),
        Command::Pause => clip.pause(),
        Command::Stop => clip.stop(),
        Command::Sfx => sfx.play(),
        Command::Status => {
            let status = serde_json::to_string(&clip.snapshot())?;
            println!("{}", status);
        }
        Command::Quit => {}
    }
    Ok(())
}

async fn run_sfx(player: &Player, locator: &str, count: u32, interval: Duration) -> Result<()> {
    let sfx = player.load_sound_effect(locator);
    sfx.wait_ready()
        .await
        .with_context(|| format!("Failed to load {}", locator))?;

    for i in 0..count {
        sfx.play();
        info!(instance = i + 1, of = count, "triggered");
        if i + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }

    while sfx.is_playing() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}
