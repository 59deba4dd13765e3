//! Audio output engine using cpal
//!
//! Drives a `Mixer` from the output device callback. Without a device, a
//! headless pump renders the mixer in real time so clocks keep moving.

use crate::{AudioError, Mixer, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Audio output engine
pub struct AudioEngine {
    /// Audio output device
    device: Device,
    /// Stream configuration
    config: StreamConfig,
    /// Output stream (when active)
    stream: Arc<Mutex<Option<Stream>>>,
    /// Sample rate
    sample_rate: u32,
}

impl AudioEngine {
    /// Create a new audio engine with the default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceError("No output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceError(format!("Failed to get default config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let config: StreamConfig = config.into();
        info!(
            sample_rate,
            channels = config.channels,
            "opened default output device"
        );

        Ok(AudioEngine {
            device,
            config,
            #[allow(clippy::arc_with_non_send_sync)]
            stream: Arc::new(Mutex::new(None)),
            sample_rate,
        })
    }

    /// Get the sample rate of the output device
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start the output stream, filling every device buffer from `mixer`
    pub fn start(&self, mixer: Mixer) -> Result<()> {
        let channels = self.config.channels as usize;
        let mut stereo: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if channels == 2 {
                        mixer.fill_buffer(data);
                        return;
                    }

                    let frames = data.len() / channels.max(1);
                    stereo.resize(frames * 2, 0.0);
                    mixer.fill_buffer(&mut stereo);
                    map_channels(&stereo, data, channels);
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceError(format!("Failed to play stream: {}", e)))?;

        *self.stream.lock() = Some(stream);

        Ok(())
    }

    /// Stop the audio stream
    pub fn stop(&self) -> Result<()> {
        let mut stream = self.stream.lock();
        if let Some(s) = stream.take() {
            s.pause()
                .map_err(|e| AudioError::DeviceError(format!("Failed to stop stream: {}", e)))?;
        }
        Ok(())
    }

    /// Check if the audio stream is running
    pub fn is_running(&self) -> bool {
        self.stream.lock().is_some()
    }
}

/// Spread interleaved stereo frames over a device with `channels` channels
fn map_channels(stereo: &[f32], out: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    for (frame, pair) in out.chunks_mut(channels).zip(stereo.chunks(2)) {
        let (left, right) = (pair[0], pair.get(1).copied().unwrap_or(pair[0]));
        if channels == 1 {
            frame[0] = (left + right) * 0.5;
            continue;
        }
        for (index, sample) in frame.iter_mut().enumerate() {
            *sample = match index {
                0 => left,
                1 => right,
                _ => 0.0,
            };
        }
    }
}

/// Render a mixer in real time without an output device
///
/// Used on machines with no sound card and in offline runs, so the mixer
/// clock and voice lifetimes still advance.
pub fn spawn_headless_pump(mixer: Mixer, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sample_rate = mixer.sample_rate() as f64;
        let origin = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(period);
        let mut scratch: Vec<f32> = Vec::new();

        loop {
            ticker.tick().await;
            let target = (origin.elapsed().as_secs_f64() * sample_rate) as u64;
            render_until(&mixer, target, &mut scratch);
        }
    })
}

/// Largest block the headless pump renders in one pass, in frames
const MAX_PUMP_FRAMES: u64 = 4096;

/// Render the mixer up to `target` frames in bounded blocks
fn render_until(mixer: &Mixer, target: u64, scratch: &mut Vec<f32>) {
    loop {
        let due = target.saturating_sub(mixer.frames_rendered());
        if due == 0 {
            return;
        }
        let frames = due.min(MAX_PUMP_FRAMES) as usize;
        scratch.resize(frames * 2, 0.0);
        mixer.fill_buffer(scratch);
    }
}
