//! Output destination shared by every source
//!
//! The mixer sums connected voices into an interleaved stereo buffer and
//! counts the frames it has rendered. That frame count is the audio
//! subsystem's clock.

use crate::{PlaybackClock, Voice};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct MixerInner {
    /// Output sample rate in Hz
    sample_rate: u32,
    /// Stereo frames rendered since creation
    frames_rendered: AtomicU64,
    /// Connected voices
    voices: Mutex<Vec<Arc<Mutex<Voice>>>>,
}

/// Cheaply cloneable handle to the output destination
#[derive(Clone)]
pub struct Mixer {
    inner: Arc<MixerInner>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Mixer {
            inner: Arc::new(MixerInner {
                sample_rate: sample_rate.max(1),
                frames_rendered: AtomicU64::new(0),
                voices: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Connect a voice so it is rendered once started
    pub fn connect(&self, voice: Arc<Mutex<Voice>>) {
        self.inner.voices.lock().push(voice);
    }

    /// Number of voices currently connected
    pub fn connected_voices(&self) -> usize {
        self.inner.voices.lock().len()
    }

    /// Number of connected voices producing output
    pub fn playing_voices(&self) -> usize {
        self.inner
            .voices
            .lock()
            .iter()
            .filter(|voice| voice.lock().is_playing())
            .count()
    }

    /// Fill an interleaved stereo buffer with the sum of all playing voices
    ///
    /// Finished voices are disconnected, as are idle voices whose handle was
    /// dropped without starting them.
    pub fn fill_buffer(&self, buffer: &mut [f32]) {
        buffer.fill(0.0);

        let sample_rate = self.inner.sample_rate;
        let mut voices = self.inner.voices.lock();
        voices.retain(|shared| {
            let handle_alive = Arc::strong_count(shared) > 1;
            let mut voice = shared.lock();
            voice.fill_buffer(buffer, sample_rate);
            !voice.is_finished() && (voice.was_started() || handle_alive)
        });
        drop(voices);

        let frames = (buffer.len() / 2) as u64;
        self.inner.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.frames_rendered.load(Ordering::Acquire)
    }
}

impl PlaybackClock for Mixer {
    fn now(&self) -> f64 {
        self.frames_rendered() as f64 / self.inner.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::OneShotSource;
    use crate::{DecodedBuffer, VoiceHandle};

    fn constant(value: f32, frames: usize, sample_rate: u32) -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::new(vec![value; frames * 2], sample_rate, 2))
    }

    #[test]
    fn test_clock_advances_with_rendered_frames() {
        let mixer = Mixer::new(100);
        assert_eq!(mixer.now(), 0.0);

        let mut out = vec![0.0; 100];
        mixer.fill_buffer(&mut out);
        assert!((mixer.now() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_voices_are_summed() {
        let mixer = Mixer::new(100);
        let mut a = VoiceHandle::new(constant(0.25, 100, 100), false);
        let mut b = VoiceHandle::new(constant(0.5, 100, 100), false);
        a.connect(&mixer);
        b.connect(&mixer);
        a.start_at(0.0, None).unwrap();
        b.start_at(0.0, None).unwrap();

        let mut out = vec![0.0; 8];
        mixer.fill_buffer(&mut out);
        assert!(out.iter().all(|s| (*s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_unstarted_voice_is_silent_but_stays_connected() {
        let mixer = Mixer::new(100);
        let mut handle = VoiceHandle::new(constant(1.0, 100, 100), false);
        handle.connect(&mixer);

        let mut out = vec![0.0; 8];
        mixer.fill_buffer(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(mixer.connected_voices(), 1);

        drop(handle);
        mixer.fill_buffer(&mut out);
        assert_eq!(mixer.connected_voices(), 0);
    }

    #[test]
    fn test_stopped_voice_is_disconnected() {
        let mixer = Mixer::new(100);
        let mut handle = VoiceHandle::new(constant(1.0, 100, 100), true);
        handle.connect(&mixer);
        handle.start_at(0.0, None).unwrap();
        assert_eq!(mixer.playing_voices(), 1);

        handle.stop_now();
        let mut out = vec![0.0; 8];
        mixer.fill_buffer(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(mixer.connected_voices(), 0);
    }

    #[test]
    fn test_fire_and_forget_voice_outlives_its_handle() {
        let mixer = Mixer::new(100);
        let mut handle = VoiceHandle::new(constant(1.0, 10, 100), false);
        handle.connect(&mixer);
        handle.start_at(0.0, None).unwrap();
        drop(handle);

        let mut out = vec![0.0; 8];
        mixer.fill_buffer(&mut out);
        assert_eq!(mixer.connected_voices(), 1);

        // Render past the end of the 10 frame buffer
        let mut out = vec![0.0; 40];
        mixer.fill_buffer(&mut out);
        mixer.fill_buffer(&mut out);
        assert_eq!(mixer.connected_voices(), 0);
    }
}
