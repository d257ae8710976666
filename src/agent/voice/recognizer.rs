// SynthNet Recognition Adapter
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Local Whisper transcription behind a serialising, time-bounded adapter.

use async_trait::async_trait;
use hf_hub::api::sync::Api;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::agent::io_shield::AtomicMover;
use crate::agent::voice::wav;
use crate::error::{VoiceApiError, VoiceResult};

const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Frame RMS above which a frame counts as speech.
pub const SPEECH_RMS_THRESHOLD: f32 = 0.01;
/// Trailing silence kept after the last speech frame.
pub const END_SILENCE_TOLERANCE_MS: u64 = 150;
const FRAME_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerInfo {
    pub id: String,
    pub name: String,
    pub culture: String,
    pub description: String,
    pub supported_audio_formats: Vec<String>,
    /// `None` means the engine waits indefinitely for speech to start.
    pub initial_silence_timeout_ms: Option<u64>,
    pub babble_timeout_ms: Option<u64>,
    pub end_silence_timeout_ms: u64,
}

/// A speech-to-text engine working on wave files.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn info(&self) -> RecognizerInfo;

    /// Load whatever the engine needs before its first call (models, caches).
    /// Not covered by the per-call timeout.
    async fn warm_up(&self) -> VoiceResult<()> {
        Ok(())
    }

    async fn recognize(&self, wav_path: &Path) -> VoiceResult<String>;
}

/// Keep the span between the first and last speech frame plus the end-silence tolerance.
///
/// Leading silence is tolerated without limit. Returns `None` when no frame
/// reaches the speech threshold.
pub fn trim_silence(samples: &[f32], sample_rate: u32) -> Option<&[f32]> {
    let frame = ((sample_rate as u64 * FRAME_MS) / 1000).max(1) as usize;
    let is_speech = |chunk: &[f32]| {
        let energy: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
        energy.sqrt() >= SPEECH_RMS_THRESHOLD
    };

    let frames: Vec<bool> = samples.chunks(frame).map(is_speech).collect();
    let first = frames.iter().position(|&s| s)?;
    let last = frames.iter().rposition(|&s| s)?;

    let tail = ((sample_rate as u64 * END_SILENCE_TOLERANCE_MS) / 1000) as usize;
    let start = first * frame;
    let end = ((last + 1) * frame + tail).min(samples.len());
    Some(&samples[start..end])
}

/// Copy a downloaded model next to its final name and move it into place, so
/// a cached model is either complete or absent.
pub fn install_model(downloaded: &Path, model_path: &Path) -> VoiceResult<()> {
    let tmp = AtomicMover::tmp_path_for(model_path);
    let result = fs::copy(downloaded, &tmp).and_then(|_| AtomicMover::commit(&tmp, model_path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(VoiceApiError::from)
}

/// Whisper (ggml) recognizer. The model is fetched on warm-up or first use.
pub struct WhisperRecognizer {
    model_name: String,
    model_path: OnceCell<PathBuf>,
    // Held by the blocking inference thread itself, so a timed-out call
    // still blocks the next one until the engine is actually free.
    inference_lock: Arc<std::sync::Mutex<()>>,
    download_lock: Arc<std::sync::Mutex<()>>,
}

impl WhisperRecognizer {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_path: OnceCell::new(),
            inference_lock: Arc::new(std::sync::Mutex::new(())),
            download_lock: Arc::new(std::sync::Mutex::new(())),
        }
    }

    async fn model_path(&self) -> VoiceResult<PathBuf> {
        let name = self.model_name.clone();
        let lock = self.download_lock.clone();
        self.model_path
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || {
                    let _download = lock.lock().unwrap_or_else(|e| e.into_inner());
                    Self::ensure_model(&name)
                })
                .await?
            })
            .await
            .cloned()
    }

    /// Ensure the GGML model is present in the local cache.
    fn ensure_model(model_name: &str) -> VoiceResult<PathBuf> {
        let base_dir = if let Ok(cache_env) = std::env::var("SYNTHNET_CACHE_DIR") {
            PathBuf::from(cache_env).join("models")
        } else {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("synthnet")
                .join("models")
        };
        fs::create_dir_all(&base_dir)?;

        let filename = format!("ggml-{}.bin", model_name);
        let model_path = base_dir.join(&filename);
        if model_path.exists() {
            info!("[STT] Found cached Whisper model: {:?}", model_path);
            return Ok(model_path);
        }

        info!("[STT] Downloading Whisper model: {}...", filename);
        let api = Api::new().map_err(|e| VoiceApiError::Upstream(format!("hf-hub: {}", e)))?;
        let repo = api.model("ggerganov/whisper.cpp".to_string());
        let downloaded = repo
            .get(&filename)
            .map_err(|e| VoiceApiError::Upstream(format!("model download failed: {}", e)))?;
        install_model(&downloaded, &model_path)?;

        info!("[STT] Model secured: {:?}", model_path);
        Ok(model_path)
    }

    fn recognize_blocking(model_path: &Path, audio_path: &Path) -> VoiceResult<String> {
        let (mono, rate) = wav::read_mono_f32(audio_path)?;
        let pcm = wav::resample_linear(&mono, rate, WHISPER_SAMPLE_RATE);
        let speech = trim_silence(&pcm, WHISPER_SAMPLE_RATE)
            .ok_or_else(|| VoiceApiError::Upstream("no speech detected".to_string()))?;

        let model = model_path
            .to_str()
            .ok_or_else(|| VoiceApiError::InvalidArgument(format!("model path is not UTF-8: {:?}", model_path)))?;
        let ctx = WhisperContext::new_with_params(model, WhisperContextParameters::default())
            .map_err(|e| VoiceApiError::Upstream(format!("failed to load model: {:?}", e)))?;
        let mut state = ctx
            .create_state()
            .map_err(|e| VoiceApiError::Upstream(format!("create state: {:?}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some("en"));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        let num_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) as i32;
        params.set_n_threads(num_threads);

        state
            .full(params, speech)
            .map_err(|e| VoiceApiError::Upstream(format!("inference failed: {:?}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| VoiceApiError::Upstream(format!("segment count: {:?}", e)))?;
        let mut text = String::new();
        for i in 0..num_segments {
            if let Ok(segment) = state.full_get_segment_text(i) {
                let segment = segment.trim();
                if !segment.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(segment);
                }
            }
        }

        if text.is_empty() {
            return Err(VoiceApiError::Upstream("no speech detected".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    fn info(&self) -> RecognizerInfo {
        RecognizerInfo {
            id: format!("whisper-{}", self.model_name),
            name: format!("Whisper ({})", self.model_name),
            culture: "en-US".to_string(),
            description: "Local Whisper dictation recognizer".to_string(),
            supported_audio_formats: vec!["audio/wav (PCM, any rate, any channels)".to_string()],
            initial_silence_timeout_ms: None,
            babble_timeout_ms: None,
            end_silence_timeout_ms: END_SILENCE_TOLERANCE_MS,
        }
    }

    async fn warm_up(&self) -> VoiceResult<()> {
        self.model_path().await.map(|_| ())
    }

    async fn recognize(&self, wav_path: &Path) -> VoiceResult<String> {
        let model_path = self.model_path().await?;
        let audio_path = wav_path.to_path_buf();
        let lock = self.inference_lock.clone();

        info!("[STT] Transcribing: {:?}", audio_path);
        tokio::task::spawn_blocking(move || {
            let _engine = lock.lock().unwrap_or_else(|e| e.into_inner());
            Self::recognize_blocking(&model_path, &audio_path)
        })
        .await?
    }
}

/// Serialises access to one recognizer and bounds every call with a timeout.
pub struct RecognitionAdapter {
    backend: Arc<dyn SpeechRecognizer>,
    engine_lock: Mutex<()>,
    timeout: Duration,
}

impl RecognitionAdapter {
    pub fn new(backend: Arc<dyn SpeechRecognizer>, timeout: Duration) -> Self {
        Self {
            backend,
            engine_lock: Mutex::new(()),
            timeout,
        }
    }

    pub fn info(&self) -> RecognizerInfo {
        self.backend.info()
    }

    /// Prepare the backend without a time limit. Safe to call repeatedly.
    pub async fn warm_up(&self) -> VoiceResult<()> {
        self.backend.warm_up().await
    }

    pub async fn recognize(&self, wav_path: &Path) -> VoiceResult<String> {
        if !wav_path.is_file() {
            return Err(VoiceApiError::NotFound(format!("audio file {:?}", wav_path)));
        }
        // Model loading is not part of the per-call budget.
        self.backend.warm_up().await?;
        let _guard = self.engine_lock.lock().await;
        match tokio::time::timeout(self.timeout, self.backend.recognize(wav_path)).await {
            Ok(result) => result,
            Err(_) => Err(VoiceApiError::Timeout(format!(
                "recognition exceeded {:?}",
                self.timeout
            ))),
        }
    }
}
