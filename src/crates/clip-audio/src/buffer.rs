//! Decoded sample data shared by every source created for a clip

/// Immutable PCM data produced by the asset loader
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// Interleaved f32 samples, normalized to [-1.0, 1.0]
    pub data: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl DecodedBuffer {
    pub fn new(data: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        DecodedBuffer {
            data,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// A silent buffer of the given length, mostly useful for tests and offline runs
    pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let frames = (seconds * sample_rate as f64).round() as usize;
        DecodedBuffer::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Duration of the buffer in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }
}
