#![allow(dead_code)]

use clip_audio::{
    AudioError, Clip, ClipOptions, DecodedBuffer, Mixer, OneShotSource, PlaybackClock,
    PlaybackContext, Result, RuntimeClock, Scheduler, SourceFactory,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Created { id: usize, looping: bool },
    Started { id: usize, offset: f64, duration: Option<f64> },
    Stopped { id: usize },
}

/// Factory recording every source it hands out
#[derive(Default)]
pub struct RecordingFactory {
    events: Arc<Mutex<Vec<SourceEvent>>>,
    next_id: Mutex<usize>,
}

impl RecordingFactory {
    pub fn events(&self) -> Vec<SourceEvent> {
        self.events.lock().clone()
    }

    pub fn created(&self) -> usize {
        *self.next_id.lock()
    }

    pub fn starts(&self) -> Vec<(usize, f64, Option<f64>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SourceEvent::Started {
                    id,
                    offset,
                    duration,
                } => Some((id, offset, duration)),
                _ => None,
            })
            .collect()
    }

    pub fn looping_of(&self, wanted: usize) -> Option<bool> {
        self.events().into_iter().find_map(|event| match event {
            SourceEvent::Created { id, looping } if id == wanted => Some(looping),
            _ => None,
        })
    }

    /// Largest number of started, not yet stopped sources at any point
    pub fn max_live(&self) -> usize {
        let mut live = 0usize;
        let mut max = 0usize;
        for event in self.events() {
            match event {
                SourceEvent::Started { .. } => {
                    live += 1;
                    max = max.max(live);
                }
                SourceEvent::Stopped { .. } => live = live.saturating_sub(1),
                SourceEvent::Created { .. } => {}
            }
        }
        max
    }

    /// Sources started but not yet stopped
    pub fn live(&self) -> usize {
        self.events().into_iter().fold(0usize, |live, event| match event {
            SourceEvent::Started { .. } => live + 1,
            SourceEvent::Stopped { .. } => live.saturating_sub(1),
            SourceEvent::Created { .. } => live,
        })
    }
}

struct RecordingSource {
    id: usize,
    started: bool,
    stopped: bool,
    events: Arc<Mutex<Vec<SourceEvent>>>,
}

impl OneShotSource for RecordingSource {
    fn start_at(&mut self, offset: f64, duration: Option<f64>) -> Result<()> {
        if self.started {
            return Err(AudioError::SourceAlreadyStarted);
        }
        self.started = true;
        self.events.lock().push(SourceEvent::Started {
            id: self.id,
            offset,
            duration,
        });
        Ok(())
    }

    fn stop_now(&mut self) {
        if self.started && !self.stopped {
            self.stopped = true;
            self.events.lock().push(SourceEvent::Stopped { id: self.id });
        }
    }

    fn connect(&mut self, _destination: &Mixer) {}
}

impl SourceFactory for RecordingFactory {
    fn create(&self, _buffer: &Arc<DecodedBuffer>, looping: bool) -> Box<dyn OneShotSource> {
        let mut next_id = self.next_id.lock();
        let id = *next_id;
        *next_id += 1;
        self.events
            .lock()
            .push(SourceEvent::Created { id, looping });
        Box::new(RecordingSource {
            id,
            started: false,
            stopped: false,
            events: Arc::clone(&self.events),
        })
    }
}

/// Clock set by hand
#[derive(Default)]
pub struct ManualClock(Mutex<f64>);

impl ManualClock {
    pub fn set(&self, seconds: f64) {
        *self.0.lock() = seconds;
    }

    pub fn advance(&self, seconds: f64) {
        *self.0.lock() += seconds;
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        *self.0.lock()
    }
}

pub fn buffer(seconds: f64) -> Arc<DecodedBuffer> {
    Arc::new(DecodedBuffer::silence(seconds, 100, 1))
}

/// Clip on the runtime clock, which follows tokio's paused time
pub fn runtime_clip(options: ClipOptions, base: f64) -> (Clip, Arc<RecordingFactory>, Arc<RuntimeClock>) {
    let factory = Arc::new(RecordingFactory::default());
    let clock = Arc::new(RuntimeClock::with_offset(base));
    let context = PlaybackContext::new(
        factory.clone(),
        clock.clone(),
        Scheduler::current().expect("tests run inside a tokio runtime"),
    );
    (Clip::new("scenario", options, context), factory, clock)
}

pub fn looping() -> ClipOptions {
    ClipOptions {
        autoplay: false,
        looping: true,
    }
}
