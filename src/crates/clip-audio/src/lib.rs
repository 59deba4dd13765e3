//! Controllable playback of decoded audio clips
//!
//! This crate provides a playback layer on top of single-use audio sources:
//! - Load an asset over HTTP or from disk and decode it once
//! - Play, pause, resume from the paused offset and stop a clip
//! - Loop a clip, including seamless re-entry after resuming mid-buffer
//! - Fire overlapping one-shot instances of short sounds

pub mod buffer;
pub mod clock;
pub mod controller;
pub mod engine;
pub mod loader;
pub mod mixer;
pub mod player;
pub mod readiness;
pub mod scheduler;
pub mod sfx;
pub mod source;
pub mod voice;

pub use buffer::DecodedBuffer;
pub use clock::{PlaybackClock, RuntimeClock};
pub use controller::{Clip, ClipOptions, PlaybackContext, PlaybackState, SessionSnapshot};
pub use engine::AudioEngine;
pub use loader::{AssetLoader, AssetLocation};
pub use mixer::Mixer;
pub use player::{OutputMode, Player, PlayerConfig};
pub use readiness::{AssetSlot, Readiness};
pub use scheduler::{Scheduler, TimerHandle};
pub use sfx::SoundEffect;
pub use source::{MixerSourceFactory, OneShotSource, SourceFactory};
pub use voice::{Voice, VoiceHandle};

/// Audio playback errors
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    #[error("Failed to load asset from URL: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("One-shot source was already started")]
    SourceAlreadyStarted,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;
