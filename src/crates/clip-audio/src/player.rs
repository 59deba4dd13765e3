//! High-level player that builds clips and sound effects from locators

use crate::controller::PlaybackContext;
use crate::engine::spawn_headless_pump;
use crate::{
    AssetLoader, AudioEngine, AudioError, Clip, ClipOptions, Mixer, MixerSourceFactory, Result,
    Scheduler, SoundEffect,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Where rendered audio goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The default output device
    #[default]
    Device,
    /// No device; the mixer is rendered and discarded in real time
    Headless,
}

/// Configuration for the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Base URL for locators that are not local files
    pub base_url: Option<String>,
    pub output: OutputMode,
    /// Mixer sample rate when running headless
    pub headless_sample_rate: u32,
    /// Reuse decoded buffers for locators loaded before
    pub cache_decoded: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            base_url: None,
            output: OutputMode::Device,
            headless_sample_rate: 44100,
            cache_decoded: true,
        }
    }
}

impl PlayerConfig {
    /// Read a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| AudioError::ConfigError(e.to_string()))
    }
}

/// Owns the output, the mixer, the loader and the scheduler shared by every
/// clip it creates
pub struct Player {
    /// Output device, absent when headless
    engine: Option<AudioEngine>,
    /// Real-time render task when headless
    pump: Option<JoinHandle<()>>,
    mixer: Mixer,
    loader: AssetLoader,
    context: PlaybackContext,
    config: PlayerConfig,
}

impl Player {
    /// Create a player; must be called from within a tokio runtime
    pub fn new(config: PlayerConfig) -> Result<Self> {
        let scheduler = Scheduler::current()?;

        let (engine, mixer, pump) = match config.output {
            OutputMode::Device => {
                let engine = AudioEngine::new()?;
                let mixer = Mixer::new(engine.sample_rate());
                engine.start(mixer.clone())?;
                (Some(engine), mixer, None)
            }
            OutputMode::Headless => {
                let mixer = Mixer::new(config.headless_sample_rate);
                let pump = spawn_headless_pump(mixer.clone(), Duration::from_millis(10));
                info!(sample_rate = mixer.sample_rate(), "running headless");
                (None, mixer, Some(pump))
            }
        };

        let mut loader = AssetLoader::new().with_cache(config.cache_decoded);
        if let Some(url) = &config.base_url {
            loader = loader.with_base_url(url.clone());
        }

        let context = PlaybackContext::new(
            Arc::new(MixerSourceFactory::new(mixer.clone())),
            Arc::new(mixer.clone()),
            scheduler,
        );

        Ok(Player {
            engine,
            pump,
            mixer,
            loader,
            context,
            config,
        })
    }

    /// Start loading `locator` and return the clip right away
    ///
    /// The clip is not ready until the decode finishes; see [`Clip::wait_ready`].
    pub fn load_clip(&self, locator: &str, options: ClipOptions) -> Clip {
        let clip = Clip::new(locator, options, self.context.clone());
        let pending = clip.clone();
        let loader = self.loader.clone();
        let locator = locator.to_string();
        self.context.scheduler.spawn(async move {
            let result = loader.fetch_and_decode(&locator).await;
            pending.complete_load(result);
        });
        clip
    }

    /// Start loading `locator` as a fire-and-forget sound effect
    pub fn load_sound_effect(&self, locator: &str) -> SoundEffect {
        let sfx = SoundEffect::new(locator, self.context.clone());
        let pending = sfx.clone();
        let loader = self.loader.clone();
        let locator = locator.to_string();
        self.context.scheduler.spawn(async move {
            let result = loader.fetch_and_decode(&locator).await;
            pending.complete_load(result);
        });
        sfx
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.context
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    /// Stop the output; clips keep their state but nothing is rendered
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(engine) = &self.engine {
            engine.stop()?;
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlaybackState, Readiness};
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn headless() -> PlayerConfig {
        PlayerConfig {
            output: OutputMode::Headless,
            headless_sample_rate: 8000,
            ..Default::default()
        }
    }

    fn write_wav(path: &Path, seconds: f64) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * 8000.0) as usize {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"output": "headless", "base_url": "https://cdn"}"#).unwrap();
        assert_eq!(config.output, OutputMode::Headless);
        assert_eq!(config.base_url.as_deref(), Some("https://cdn"));
        assert_eq!(config.headless_sample_rate, 44100);
        assert!(config.cache_decoded);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{"cache_decoded": false}"#).unwrap();
        let config = PlayerConfig::from_json_file(&path).unwrap();
        assert!(!config.cache_decoded);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PlayerConfig::from_json_file(&path),
            Err(AudioError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_headless_clip_loads_and_plays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 0.2);

        let player = Player::new(headless()).unwrap();
        let clip = player.load_clip(path.to_str().unwrap(), ClipOptions::default());
        clip.wait_ready().await.unwrap();
        assert_eq!(clip.readiness(), Readiness::Ready);

        clip.play();
        assert!(clip.is_playing());
        assert_eq!(player.mixer().connected_voices(), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!clip.is_playing());
        assert_eq!(clip.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_autoplay_clip_starts_after_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auto.wav");
        write_wav(&path, 1.0);

        let player = Player::new(headless()).unwrap();
        let options = ClipOptions {
            autoplay: true,
            looping: true,
        };
        let clip = player.load_clip(path.to_str().unwrap(), options);
        clip.play();
        clip.wait_ready().await.unwrap();
        assert!(clip.is_playing());
        assert_eq!(player.mixer().connected_voices(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_headless_rendering() {
        let mut player = Player::new(headless()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(player.mixer().frames_rendered() > 0);

        player.shutdown().unwrap();
        // Let the aborted pump task be dropped
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frozen = player.mixer().frames_rendered();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(player.mixer().frames_rendered(), frozen);

        // A second shutdown has nothing left to stop
        player.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_missing_asset_never_becomes_ready() {
        let player = Player::new(headless()).unwrap();
        let clip = player.load_clip("/no/such/asset.wav", ClipOptions::default());
        assert!(matches!(
            clip.wait_ready().await,
            Err(AudioError::AssetUnavailable(_))
        ));

        clip.play();
        assert_eq!(clip.state(), PlaybackState::Stopped);
        assert_eq!(player.mixer().connected_voices(), 0);
    }
}
