//! Playback controller for a single clip
//!
//! Sources are single-use, so every start or resume creates a fresh one from
//! the factory. The session owns at most one live source and stops it before
//! replacing or dropping it.
//!
//! Resuming a looping clip mid-buffer plays the remainder on a non-looping
//! source and schedules a restart at the loop boundary. The restart begins a
//! new looping source at offset 0. Every transition bumps the session
//! generation, and a restart scheduled under an older generation does
//! nothing.

use crate::readiness::{AssetSlot, Readiness};
use crate::source::{OneShotSource, SourceFactory};
use crate::{DecodedBuffer, PlaybackClock, Result, Scheduler, SoundEffect, TimerHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Construction-time options for a clip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipOptions {
    /// Start playing as soon as the asset is decoded
    pub autoplay: bool,
    /// Loop for the lifetime of the clip
    #[serde(rename = "loop")]
    pub looping: bool,
}

/// Dependencies injected into every clip and sound effect
#[derive(Clone)]
pub struct PlaybackContext {
    pub factory: Arc<dyn SourceFactory>,
    pub clock: Arc<dyn PlaybackClock>,
    pub scheduler: Scheduler,
}

impl PlaybackContext {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        clock: Arc<dyn PlaybackClock>,
        scheduler: Scheduler,
    ) -> Self {
        PlaybackContext {
            factory,
            clock,
            scheduler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Point-in-time view of a clip's session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub is_playing: bool,
    pub looping: bool,
    pub readiness: Readiness,
    /// Clock time at which the current run would have started from offset 0
    pub start_clock_time: f64,
    /// Offset to resume from; nonzero only while paused
    pub paused_offset: f64,
    /// Seconds of buffer content played in the current run
    pub elapsed: f64,
    pub has_active_source: bool,
    pub loop_restart_pending: bool,
    pub generation: u64,
}

struct Session {
    state: PlaybackState,
    start_clock_time: f64,
    paused_offset: f64,
    active_source: Option<Box<dyn OneShotSource>>,
    pending_loop: Option<TimerHandle>,
    generation: u64,
}

impl Session {
    fn new() -> Self {
        Session {
            state: PlaybackState::Stopped,
            start_clock_time: 0.0,
            paused_offset: 0.0,
            active_source: None,
            pending_loop: None,
            generation: 0,
        }
    }

    fn cancel_pending_loop(&mut self) {
        if let Some(timer) = self.pending_loop.take() {
            timer.cancel();
        }
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.active_source.take() {
            source.stop_now();
        }
    }

    fn install(&mut self, source: Box<dyn OneShotSource>, start_clock_time: f64) {
        self.generation += 1;
        self.active_source = Some(source);
        self.start_clock_time = start_clock_time;
        self.paused_offset = 0.0;
        self.state = PlaybackState::Playing;
    }

    fn settle_stopped(&mut self) {
        self.cancel_pending_loop();
        self.release_source();
        self.generation += 1;
        self.start_clock_time = 0.0;
        self.paused_offset = 0.0;
        self.state = PlaybackState::Stopped;
    }
}

struct ClipInner {
    label: String,
    looping: bool,
    autoplay: bool,
    slot: Arc<AssetSlot>,
    context: PlaybackContext,
    session: Mutex<Session>,
}

impl ClipInner {
    /// Playing, and either looping or still inside the buffer
    fn sounding(&self, session: &Session, buffer: &DecodedBuffer, now: f64) -> bool {
        session.state == PlaybackState::Playing
            && (self.looping || now - session.start_clock_time < buffer.duration())
    }

    fn start_fresh(
        &self,
        session: &mut Session,
        buffer: &Arc<DecodedBuffer>,
        now: f64,
    ) -> Result<()> {
        let mut source = self.context.factory.create(buffer, self.looping);
        source.start_at(0.0, None)?;
        session.install(source, now);
        debug!(
            clip = %self.label,
            generation = session.generation,
            looping = self.looping,
            "clip started"
        );
        Ok(())
    }

    fn resume(
        self: &Arc<Self>,
        session: &mut Session,
        buffer: &Arc<DecodedBuffer>,
        now: f64,
    ) -> Result<()> {
        let offset = session.paused_offset;
        let remaining = (buffer.duration() - offset).max(0.0);

        // A looping source would wrap to offset 0 rather than the resume point,
        // so the remainder always plays on a non-looping source.
        let mut source = self.context.factory.create(buffer, false);
        source.start_at(offset, Some(remaining))?;
        session.install(source, now - offset);

        if self.looping {
            let generation = session.generation;
            let clip = Arc::downgrade(self);
            let timer = self.context.scheduler.schedule_after(
                Duration::from_secs_f64(remaining),
                move || restart_at_boundary(clip, generation),
            );
            session.pending_loop = Some(timer);
        }

        debug!(
            clip = %self.label,
            generation = session.generation,
            offset,
            remaining,
            "clip resumed"
        );
        Ok(())
    }

    fn restart_loop(&self, generation: u64) {
        let Some(buffer) = self.slot.buffer() else {
            return;
        };
        let mut session = self.session.lock();
        if session.generation != generation || session.state != PlaybackState::Playing {
            debug!(clip = %self.label, generation, "stale loop restart ignored");
            return;
        }

        // This timer is the one firing
        session.pending_loop = None;
        session.release_source();

        let now = self.context.clock.now();
        if let Err(e) = self.start_fresh(&mut session, &buffer, now) {
            error!(clip = %self.label, "loop restart failed: {}", e);
            session.settle_stopped();
        }
        check_invariants(&session);
    }
}

impl Drop for ClipInner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        session.cancel_pending_loop();
        session.release_source();
    }
}

fn restart_at_boundary(clip: Weak<ClipInner>, generation: u64) {
    if let Some(clip) = clip.upgrade() {
        clip.restart_loop(generation);
    }
}

fn check_invariants(session: &Session) {
    debug_assert_eq!(
        session.active_source.is_some(),
        session.state == PlaybackState::Playing,
        "a source is live exactly while playing"
    );
    debug_assert!(
        session.paused_offset <= 0.0 || session.state != PlaybackState::Playing,
        "a paused offset is only kept while not playing"
    );
}

/// A pausable, resumable, optionally looping clip
///
/// Operations before the asset is ready, and transitions that make no sense
/// in the current state, are silent no-ops.
#[derive(Clone)]
pub struct Clip {
    inner: Arc<ClipInner>,
}

impl Clip {
    /// Create a clip whose asset is still loading
    ///
    /// Hand the decode result to [`Clip::complete_load`] when it arrives.
    pub fn new(label: impl Into<String>, options: ClipOptions, context: PlaybackContext) -> Self {
        Self::with_slot(label, options, context, Arc::new(AssetSlot::new()))
    }

    /// Create a clip over an existing asset slot
    pub fn with_slot(
        label: impl Into<String>,
        options: ClipOptions,
        context: PlaybackContext,
        slot: Arc<AssetSlot>,
    ) -> Self {
        Clip {
            inner: Arc::new(ClipInner {
                label: label.into(),
                looping: options.looping,
                autoplay: options.autoplay,
                slot,
                context,
                session: Mutex::new(Session::new()),
            }),
        }
    }

    /// Completion hook for the asset load
    ///
    /// On success the clip becomes ready and autoplays if requested. On
    /// failure it stays not ready forever.
    pub fn complete_load(&self, result: Result<Arc<DecodedBuffer>>) {
        match result {
            Ok(buffer) => {
                let duration = buffer.duration();
                if !self.inner.slot.fill(buffer) {
                    return;
                }
                info!(clip = %self.inner.label, duration, "clip ready");
                if self.inner.autoplay {
                    self.play();
                }
            }
            Err(e) => {
                warn!(clip = %self.inner.label, "clip failed to load: {}", e);
                self.inner.slot.fail(e.to_string());
            }
        }
    }

    /// Start from the beginning, or resume from the paused offset
    pub fn play(&self) {
        let Some(buffer) = self.inner.slot.buffer() else {
            debug!(clip = %self.inner.label, "play ignored, asset not ready");
            return;
        };

        let mut session = self.inner.session.lock();
        let now = self.inner.context.clock.now();

        let result = match session.state {
            PlaybackState::Playing if self.inner.sounding(&session, &buffer, now) => return,
            PlaybackState::Playing => {
                // Ran to its natural end: release the spent source and start over
                session.settle_stopped();
                self.inner.start_fresh(&mut session, &buffer, now)
            }
            PlaybackState::Paused if session.paused_offset > 0.0 => {
                self.inner.resume(&mut session, &buffer, now)
            }
            PlaybackState::Paused | PlaybackState::Stopped => {
                self.inner.start_fresh(&mut session, &buffer, now)
            }
        };

        if let Err(e) = result {
            error!(clip = %self.inner.label, "failed to start source: {}", e);
        }
        check_invariants(&session);
    }

    /// Pause, remembering the offset to resume from
    pub fn pause(&self) {
        let Some(buffer) = self.inner.slot.buffer() else {
            return;
        };

        let mut session = self.inner.session.lock();
        if session.state != PlaybackState::Playing {
            return;
        }

        session.cancel_pending_loop();

        let now = self.inner.context.clock.now();
        if !self.inner.sounding(&session, &buffer, now) {
            session.settle_stopped();
            check_invariants(&session);
            return;
        }

        let duration = buffer.duration();
        let elapsed = now - session.start_clock_time;
        session.release_source();
        session.generation += 1;
        session.paused_offset = if duration > 0.0 {
            elapsed.rem_euclid(duration)
        } else {
            0.0
        };
        session.start_clock_time = 0.0;
        session.state = PlaybackState::Paused;

        debug!(
            clip = %self.inner.label,
            offset = session.paused_offset,
            "clip paused"
        );
        check_invariants(&session);
    }

    /// Stop and rewind to offset 0
    pub fn stop(&self) {
        let mut session = self.inner.session.lock();
        session.cancel_pending_loop();
        if session.state == PlaybackState::Stopped {
            return;
        }

        session.settle_stopped();
        debug!(clip = %self.inner.label, "clip stopped");
        check_invariants(&session);
    }

    /// Playing, and either looping or not yet past the end of the buffer
    pub fn is_playing(&self) -> bool {
        let Some(buffer) = self.inner.slot.buffer() else {
            return false;
        };
        let session = self.inner.session.lock();
        let now = self.inner.context.clock.now();
        self.inner.sounding(&session, &buffer, now)
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.session.lock().state
    }

    pub fn is_looping(&self) -> bool {
        self.inner.looping
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn readiness(&self) -> Readiness {
        self.inner.slot.readiness()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Readiness> {
        self.inner.slot.subscribe()
    }

    /// Wait until the asset is decoded, or fail if it never will be
    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.slot.wait_ready().await.map(|_| ())
    }

    /// Buffer duration in seconds, once ready
    pub fn duration(&self) -> Option<f64> {
        self.inner.slot.buffer().map(|buffer| buffer.duration())
    }

    /// Seconds of buffer content played in the current run
    pub fn elapsed(&self) -> f64 {
        let session = self.inner.session.lock();
        match session.state {
            PlaybackState::Playing => self.inner.context.clock.now() - session.start_clock_time,
            PlaybackState::Paused => session.paused_offset,
            PlaybackState::Stopped => 0.0,
        }
    }

    /// Consistent view of the session, taken under one lock at one instant
    pub fn snapshot(&self) -> SessionSnapshot {
        let buffer = self.inner.slot.buffer();
        let session = self.inner.session.lock();
        let now = self.inner.context.clock.now();

        let is_playing = buffer
            .as_deref()
            .map_or(false, |buffer| self.inner.sounding(&session, buffer, now));
        let elapsed = match session.state {
            PlaybackState::Playing => now - session.start_clock_time,
            PlaybackState::Paused => session.paused_offset,
            PlaybackState::Stopped => 0.0,
        };

        SessionSnapshot {
            state: session.state,
            is_playing,
            looping: self.inner.looping,
            readiness: self.inner.slot.readiness(),
            start_clock_time: session.start_clock_time,
            paused_offset: session.paused_offset,
            elapsed,
            has_active_source: session.active_source.is_some(),
            loop_restart_pending: session
                .pending_loop
                .as_ref()
                .map_or(false, |timer| !timer.is_finished()),
            generation: session.generation,
        }
    }

    /// Fire-and-forget player sharing this clip's decoded buffer
    pub fn sound_effect(&self) -> SoundEffect {
        SoundEffect::with_slot(
            self.inner.label.clone(),
            self.inner.context.clone(),
            Arc::clone(&self.inner.slot),
        )
    }
}
