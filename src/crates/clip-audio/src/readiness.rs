//! Readiness of a clip's decoded buffer

use crate::{AudioError, DecodedBuffer, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Whether a clip's asset has arrived
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Readiness {
    /// Fetch or decode still in progress
    Loading,
    /// Buffer decoded; playback operations take effect
    Ready,
    /// The asset never became available; playback operations stay no-ops
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Decoded buffer shared between a clip and its sound effects
///
/// Resolves exactly once, either to a buffer or to a failure.
pub struct AssetSlot {
    buffer: RwLock<Option<Arc<DecodedBuffer>>>,
    readiness: watch::Sender<Readiness>,
}

impl AssetSlot {
    pub fn new() -> Self {
        let (readiness, _) = watch::channel(Readiness::Loading);
        AssetSlot {
            buffer: RwLock::new(None),
            readiness,
        }
    }

    /// A slot that is ready from the start
    pub fn with_buffer(buffer: Arc<DecodedBuffer>) -> Self {
        let slot = Self::new();
        slot.fill(buffer);
        slot
    }

    pub fn buffer(&self) -> Option<Arc<DecodedBuffer>> {
        self.buffer.read().clone()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    /// Store the decoded buffer; returns false if the slot was already resolved
    pub fn fill(&self, buffer: Arc<DecodedBuffer>) -> bool {
        let mut slot = self.buffer.write();
        if *self.readiness.borrow() != Readiness::Loading {
            return false;
        }
        *slot = Some(buffer);
        self.readiness.send_replace(Readiness::Ready);
        true
    }

    /// Mark the asset as permanently unavailable
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let _slot = self.buffer.write();
        if *self.readiness.borrow() != Readiness::Loading {
            return false;
        }
        self.readiness.send_replace(Readiness::Failed(reason.into()));
        true
    }

    /// Wait until the slot resolves
    pub async fn wait_ready(&self) -> Result<Arc<DecodedBuffer>> {
        let mut receiver = self.subscribe();
        let resolved = receiver
            .wait_for(|state| *state != Readiness::Loading)
            .await
            .map_err(|e| AudioError::Other(e.to_string()))?
            .clone();

        match resolved {
            Readiness::Ready => self
                .buffer()
                .ok_or_else(|| AudioError::Other("ready without a buffer".to_string())),
            Readiness::Failed(reason) => Err(AudioError::AssetUnavailable(reason)),
            Readiness::Loading => Err(AudioError::Other("still loading".to_string())),
        }
    }
}

impl Default for AssetSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn buffer() -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::silence(1.0, 100, 1))
    }

    #[test]
    fn test_slot_starts_loading() {
        let slot = AssetSlot::new();
        assert_eq!(slot.readiness(), Readiness::Loading);
        assert!(slot.buffer().is_none());
    }

    #[test]
    fn test_slot_resolves_once() {
        let slot = AssetSlot::new();
        assert!(slot.fill(buffer()));
        assert!(!slot.fail("late failure"));
        assert!(!slot.fill(buffer()));
        assert!(slot.readiness().is_ready());
    }

    #[test]
    fn test_failed_slot_never_gets_buffer() {
        let slot = AssetSlot::new();
        assert!(slot.fail("404"));
        assert!(!slot.fill(buffer()));
        assert!(slot.buffer().is_none());
        assert_eq!(slot.readiness(), Readiness::Failed("404".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_resolves_on_fill() {
        let slot = Arc::new(AssetSlot::new());
        let filler = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            filler.fill(buffer());
        });

        let decoded = slot.wait_ready().await.unwrap();
        assert_eq!(decoded.sample_rate, 100);
    }

    #[tokio::test]
    async fn test_wait_ready_reports_failure() {
        let slot = AssetSlot::new();
        slot.fail("decode error");
        assert!(matches!(
            slot.wait_ready().await,
            Err(AudioError::AssetUnavailable(reason)) if reason == "decode error"
        ));
    }

    #[test]
    fn test_readiness_serializes_with_reason() {
        let json = serde_json::to_string(&Readiness::Failed("gone".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"gone"}"#);
        let json = serde_json::to_string(&Readiness::Ready).unwrap();
        assert_eq!(json, r#"{"status":"ready"}"#);
    }
}
