//! Fire-and-forget playback of short sounds
//!
//! Every trigger starts an independent, non-looping source that plays to its
//! end. Instances overlap freely and cannot be paused or stopped.

use crate::controller::PlaybackContext;
use crate::readiness::{AssetSlot, Readiness};
use crate::{DecodedBuffer, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct SoundEffectInner {
    label: String,
    slot: Arc<AssetSlot>,
    context: PlaybackContext,
    /// Clock time of the most recent trigger
    last_trigger: Mutex<Option<f64>>,
}

#[derive(Clone)]
pub struct SoundEffect {
    inner: Arc<SoundEffectInner>,
}

impl SoundEffect {
    /// Create a sound effect whose asset is still loading
    pub fn new(label: impl Into<String>, context: PlaybackContext) -> Self {
        Self::with_slot(label, context, Arc::new(AssetSlot::new()))
    }

    pub fn with_slot(label: impl Into<String>, context: PlaybackContext, slot: Arc<AssetSlot>) -> Self {
        SoundEffect {
            inner: Arc::new(SoundEffectInner {
                label: label.into(),
                slot,
                context,
                last_trigger: Mutex::new(None),
            }),
        }
    }

    /// Completion hook for the asset load
    pub fn complete_load(&self, result: Result<Arc<DecodedBuffer>>) {
        match result {
            Ok(buffer) => {
                if self.inner.slot.fill(buffer) {
                    info!(sfx = %self.inner.label, "sound effect ready");
                }
            }
            Err(e) => {
                warn!(sfx = %self.inner.label, "sound effect failed to load: {}", e);
                self.inner.slot.fail(e.to_string());
            }
        }
    }

    /// Trigger a new instance from offset 0
    pub fn play(&self) {
        let Some(buffer) = self.inner.slot.buffer() else {
            debug!(sfx = %self.inner.label, "trigger ignored, asset not ready");
            return;
        };

        let mut source = self.inner.context.factory.create(&buffer, false);
        if let Err(e) = source.start_at(0.0, None) {
            error!(sfx = %self.inner.label, "failed to start source: {}", e);
            return;
        }
        // The output keeps the started source alive until it finishes
        drop(source);

        *self.inner.last_trigger.lock() = Some(self.inner.context.clock.now());
    }

    /// Whether the most recent instance is still within its buffer duration
    pub fn is_playing(&self) -> bool {
        let Some(buffer) = self.inner.slot.buffer() else {
            return false;
        };
        match *self.inner.last_trigger.lock() {
            Some(started) => self.inner.context.clock.now() - started < buffer.duration(),
            None => false,
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.inner.slot.readiness()
    }

    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.slot.wait_ready().await.map(|_| ())
    }

    pub fn duration(&self) -> Option<f64> {
        self.inner.slot.buffer().map(|buffer| buffer.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mixer, MixerSourceFactory, PlaybackClock, Scheduler};

    fn setup() -> (SoundEffect, Mixer) {
        let mixer = Mixer::new(100);
        let context = PlaybackContext::new(
            Arc::new(MixerSourceFactory::new(mixer.clone())),
            Arc::new(mixer.clone()),
            Scheduler::current().unwrap(),
        );
        (SoundEffect::new("blip", context), mixer)
    }

    fn one_second() -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::new(vec![0.25; 100], 100, 1))
    }

    #[tokio::test]
    async fn test_trigger_before_ready_is_noop() {
        let (sfx, mixer) = setup();
        sfx.play();
        assert!(!sfx.is_playing());
        assert_eq!(mixer.connected_voices(), 0);
    }

    #[tokio::test]
    async fn test_triggers_overlap() {
        let (sfx, mixer) = setup();
        sfx.complete_load(Ok(one_second()));

        sfx.play();
        let mut out = vec![0.0; 20];
        mixer.fill_buffer(&mut out);
        sfx.play();
        assert_eq!(mixer.playing_voices(), 2);

        mixer.fill_buffer(&mut out);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_is_playing_tracks_latest_instance() {
        let (sfx, mixer) = setup();
        sfx.complete_load(Ok(one_second()));

        sfx.play();
        assert!(sfx.is_playing());

        // 0.6s later, trigger again; the first instance ends at 1.0s
        let mut out = vec![0.0; 120];
        mixer.fill_buffer(&mut out);
        sfx.play();

        let mut out = vec![0.0; 100];
        mixer.fill_buffer(&mut out);
        assert!((mixer.now() - 1.1).abs() < 1e-9);
        assert!(sfx.is_playing());
        assert_eq!(mixer.connected_voices(), 1);

        let mut out = vec![0.0; 120];
        mixer.fill_buffer(&mut out);
        assert!(!sfx.is_playing());
    }
}
