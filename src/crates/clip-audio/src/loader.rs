//! Asset loading
//!
//! Fetches raw bytes from disk or over HTTP and decodes them into a
//! `DecodedBuffer` with Symphonia, caching decoded buffers per locator.

use crate::{AudioError, DecodedBuffer, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Where an asset's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Http(String),
    File(PathBuf),
}

impl AssetLocation {
    fn cache_key(&self) -> String {
        match self {
            AssetLocation::Http(url) => url.clone(),
            AssetLocation::File(path) => path.display().to_string(),
        }
    }
}

/// Loads and caches decoded assets
///
/// The cache only holds weak references; a buffer lives as long as some clip
/// or sound effect holds it.
#[derive(Clone)]
pub struct AssetLoader {
    /// Decoded buffers by resolved locator
    cache: Arc<RwLock<HashMap<String, Weak<DecodedBuffer>>>>,
    /// Base URL for locators that are not local files
    base_url: Option<String>,
    cache_decoded: bool,
}

impl AssetLoader {
    pub fn new() -> Self {
        AssetLoader {
            cache: Arc::new(RwLock::new(HashMap::new())),
            base_url: None,
            cache_decoded: true,
        }
    }

    /// Resolve relative locators that are not local files against `url`
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_decoded = enabled;
        self
    }

    /// Work out where a locator's bytes live
    pub fn resolve(&self, locator: &str) -> AssetLocation {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return AssetLocation::Http(locator.to_string());
        }
        if let Some(path) = locator.strip_prefix("file://") {
            return AssetLocation::File(PathBuf::from(path));
        }

        let path = PathBuf::from(locator);
        match &self.base_url {
            Some(base) if !path.is_absolute() && !path.exists() => {
                AssetLocation::Http(format!("{}/{}", base, locator.trim_start_matches('/')))
            }
            _ => AssetLocation::File(path),
        }
    }

    /// Fetch and decode on a blocking thread of the current runtime
    pub async fn fetch_and_decode(&self, locator: &str) -> Result<Arc<DecodedBuffer>> {
        let loader = self.clone();
        let locator = locator.to_string();
        tokio::task::spawn_blocking(move || loader.load_blocking(&locator))
            .await
            .map_err(|e| AudioError::Other(format!("Decode task failed: {}", e)))?
    }

    /// Fetch and decode on the calling thread
    pub fn load_blocking(&self, locator: &str) -> Result<Arc<DecodedBuffer>> {
        let location = self.resolve(locator);
        let key = location.cache_key();

        if self.cache_decoded {
            let cached = self.cache.read().get(&key).and_then(Weak::upgrade);
            if let Some(buffer) = cached {
                debug!(locator, "decoded buffer served from cache");
                return Ok(buffer);
            }
        }

        let bytes = self.fetch_bytes(&location)?;
        let buffer = Arc::new(decode_audio(bytes, &key)?);
        debug!(
            locator,
            duration = buffer.duration(),
            sample_rate = buffer.sample_rate,
            channels = buffer.channels,
            "asset decoded"
        );

        if self.cache_decoded {
            let mut cache = self.cache.write();
            cache.retain(|_, entry| entry.strong_count() > 0);
            cache.insert(key, Arc::downgrade(&buffer));
        }
        Ok(buffer)
    }

    fn fetch_bytes(&self, location: &AssetLocation) -> Result<Vec<u8>> {
        match location {
            AssetLocation::File(path) => Ok(std::fs::read(path)?),
            AssetLocation::Http(url) => {
                let response = reqwest::blocking::get(url)
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| AudioError::HttpError(format!("Failed to download {}: {}", url, e)))?;
                let bytes = response
                    .bytes()
                    .map_err(|e| AudioError::HttpError(format!("Failed to read bytes: {}", e)))?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Number of cached buffers still alive
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an in-memory asset into interleaved f32 samples
///
/// `name` is only used as a format hint through its extension.
pub fn decode_audio(data: Vec<u8>, name: &str) -> Result<DecodedBuffer> {
    let cursor = Cursor::new(data);
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    let extension = Path::new(name.split('?').next().unwrap_or(name))
        .extension()
        .and_then(|ext| ext.to_str());
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::DecodeError(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::DecodeError("No valid audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodeError(format!("Failed to create decoder: {}", e)))?;

    let mut audio_data: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AudioError::DecodeError(format!("Format error: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                samples.copy_interleaved_ref(decoded);
                audio_data.extend_from_slice(samples.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet in {}: {}", name, e);
            }
            Err(e) => {
                return Err(AudioError::DecodeError(format!(
                    "Failed to decode packet: {}",
                    e
                )));
            }
        }
    }

    if audio_data.is_empty() {
        return Err(AudioError::DecodeError(format!("No audio decoded from {}", name)));
    }

    Ok(DecodedBuffer::new(audio_data, sample_rate, channels))
}
