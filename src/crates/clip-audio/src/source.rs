//! One-shot sources and the factory that wires them to the output

use crate::{DecodedBuffer, Mixer, Result, VoiceHandle};
use std::sync::Arc;

/// A playable primitive that can be started exactly once
///
/// After `stop_now`, or after it has played to its end, a source is spent and
/// must be replaced by a fresh one from the factory.
pub trait OneShotSource: Send {
    /// Start at `offset` seconds into the buffer, for `duration` seconds or
    /// to the end of the buffer when `None`
    ///
    /// Returns `AudioError::SourceAlreadyStarted` on a second call.
    fn start_at(&mut self, offset: f64, duration: Option<f64>) -> Result<()>;

    /// Stop output immediately
    fn stop_now(&mut self);

    /// Route the source's output into `destination`
    fn connect(&mut self, destination: &Mixer);
}

/// Produces fresh one-shot sources already connected to an output
pub trait SourceFactory: Send + Sync {
    fn create(&self, buffer: &Arc<DecodedBuffer>, looping: bool) -> Box<dyn OneShotSource>;
}

/// Factory creating voices connected to an injected mixer
#[derive(Clone)]
pub struct MixerSourceFactory {
    destination: Mixer,
}

impl MixerSourceFactory {
    pub fn new(destination: Mixer) -> Self {
        MixerSourceFactory { destination }
    }

    pub fn destination(&self) -> &Mixer {
        &self.destination
    }
}

impl SourceFactory for MixerSourceFactory {
    fn create(&self, buffer: &Arc<DecodedBuffer>, looping: bool) -> Box<dyn OneShotSource> {
        let mut voice = VoiceHandle::new(Arc::clone(buffer), looping);
        voice.connect(&self.destination);
        Box::new(voice)
    }
}
