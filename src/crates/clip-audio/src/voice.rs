//! Voice represents a single one-shot playback instance of a decoded buffer

use crate::source::OneShotSource;
use crate::{AudioError, DecodedBuffer, Mixer, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceState {
    /// Created but not started yet
    Idle,
    Playing,
    /// Stopped or ran past its end; never plays again
    Finished,
}

/// Render-side state of a one-shot source
pub struct Voice {
    /// The buffer being played
    buffer: Arc<DecodedBuffer>,
    /// Current playback position (in frames)
    position: f64,
    /// Position at which a non-looping voice finishes (in frames)
    end: f64,
    /// Wrap back to frame 0 at the end of the buffer
    looping: bool,
    state: VoiceState,
}

impl Voice {
    /// Create a new, not yet started voice for the given buffer
    pub fn new(buffer: Arc<DecodedBuffer>, looping: bool) -> Self {
        let end = buffer.frames() as f64;
        Voice {
            buffer,
            position: 0.0,
            end,
            looping,
            state: VoiceState::Idle,
        }
    }

    /// Start playback at `offset` seconds into the buffer
    ///
    /// `duration` limits how many seconds are played; `None` plays to the end
    /// of the buffer. A voice can be started at most once.
    pub fn start(&mut self, offset: f64, duration: Option<f64>) -> Result<()> {
        if self.state != VoiceState::Idle {
            return Err(AudioError::SourceAlreadyStarted);
        }

        let rate = self.buffer.sample_rate as f64;
        let frames = self.buffer.frames() as f64;
        let offset = offset.max(0.0);

        self.position = (offset * rate).min(frames);
        self.end = match duration {
            Some(seconds) => ((offset + seconds.max(0.0)) * rate).min(frames),
            None => frames,
        };
        self.state = VoiceState::Playing;
        Ok(())
    }

    /// Stop immediately; the voice is dropped by the mixer on its next pass
    pub fn stop(&mut self) {
        self.state = VoiceState::Finished;
    }

    /// Check if this voice is currently producing output
    pub fn is_playing(&self) -> bool {
        self.state == VoiceState::Playing
    }

    /// Check if this voice has stopped or run to its end
    pub fn is_finished(&self) -> bool {
        self.state == VoiceState::Finished
    }

    pub fn was_started(&self) -> bool {
        self.state != VoiceState::Idle
    }

    /// Get the next stereo sample pair (L, R)
    ///
    /// Returns None if the voice is not playing
    pub fn next_sample(&mut self, output_sample_rate: u32) -> Option<(f32, f32)> {
        if self.state != VoiceState::Playing {
            return None;
        }

        let frames = self.buffer.frames() as f64;
        if frames == 0.0 {
            self.state = VoiceState::Finished;
            return None;
        }

        if self.looping {
            while self.position >= frames {
                self.position -= frames;
            }
        } else if self.position >= self.end {
            self.state = VoiceState::Finished;
            return None;
        }

        let (left, right) = if self.buffer.channels == 1 {
            // Mono: duplicate to both channels
            let sample = self.interpolate_sample_at_position(self.position, 0);
            (sample, sample)
        } else {
            let left = self.interpolate_sample_at_position(self.position, 0);
            let right = self.interpolate_sample_at_position(self.position, 1);
            (left, right)
        };

        // Advance position, accounting for sample rate differences
        let rate_ratio = self.buffer.sample_rate as f64 / output_sample_rate as f64;
        self.position += rate_ratio;

        Some((left, right))
    }

    /// Linear interpolation between the two frames around `frame_position`
    fn interpolate_sample_at_position(&self, frame_position: f64, channel_offset: usize) -> f32 {
        let data = &self.buffer.data;
        let channels = self.buffer.channels as usize;

        let base_index = (frame_position.floor() as usize) * channels + channel_offset;
        if base_index >= data.len() {
            return 0.0;
        }

        let fraction = (frame_position - frame_position.floor()) as f32;
        let sample_current = data[base_index];

        let next_index = base_index + channels;
        if next_index >= data.len() {
            return sample_current;
        }

        let sample_next = data[next_index];
        sample_current + (sample_next - sample_current) * fraction
    }

    /// Mix this voice into a buffer
    ///
    /// The buffer is interleaved stereo (L, R, L, R, ...)
    pub fn fill_buffer(&mut self, buffer: &mut [f32], output_sample_rate: u32) {
        for chunk in buffer.chunks_mut(2) {
            if let Some((left, right)) = self.next_sample(output_sample_rate) {
                if chunk.len() == 2 {
                    chunk[0] += left;
                    chunk[1] += right;
                }
            } else {
                break;
            }
        }
    }
}

/// Control-side handle to a voice, shared with the mixer once connected
pub struct VoiceHandle {
    voice: Arc<Mutex<Voice>>,
}

impl VoiceHandle {
    pub fn new(buffer: Arc<DecodedBuffer>, looping: bool) -> Self {
        VoiceHandle {
            voice: Arc::new(Mutex::new(Voice::new(buffer, looping))),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.voice.lock().is_playing()
    }

    pub fn is_finished(&self) -> bool {
        self.voice.lock().is_finished()
    }
}

impl OneShotSource for VoiceHandle {
    fn start_at(&mut self, offset: f64, duration: Option<f64>) -> Result<()> {
        self.voice.lock().start(offset, duration)
    }

    fn stop_now(&mut self) {
        self.voice.lock().stop();
    }

    fn connect(&mut self, destination: &Mixer) {
        destination.connect(Arc::clone(&self.voice));
    }
}
