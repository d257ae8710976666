#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use synthnet_voice::agent::conversation::{ChatMessage, ChatProvider, ChunkStream};
use synthnet_voice::agent::core::VoiceServices;
use synthnet_voice::agent::voice::{RecognizerInfo, SpeechRecognizer, SpeechSynthesizer, VoiceDescriptor};
use synthnet_voice::config::Settings;
use synthnet_voice::state::{AppState, KernelState};
use synthnet_voice::{VoiceApiError, VoiceResult};

pub const TEMPLATE: &str = "<html><body>{{__TEXT__}}</body></html>";

/// Renders a half-second 8 kHz tone and remembers which voice was asked for.
#[derive(Default)]
pub struct FakeSynth {
    pub voices_used: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn engine_name(&self) -> &str {
        "fake"
    }

    async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>> {
        Ok(["English_(Jane)", "English_(David)"]
            .iter()
            .map(|id| VoiceDescriptor {
                id: id.to_string(),
                name: id.replace('_', " "),
                culture: "en-us".to_string(),
                gender: "NotSet".to_string(),
                age: "NotSet".to_string(),
                enabled: true,
            })
            .collect())
    }

    async fn render(&self, _text: &str, voice: Option<&str>, output: &Path) -> VoiceResult<()> {
        self.voices_used.lock().unwrap().push(voice.map(str::to_owned));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(output, spec)?;
        for i in 0..4000 {
            w.write_sample(((i % 20) as i16 - 10) * 800)?;
        }
        w.finalize()?;
        Ok(())
    }
}

pub struct FakeRecognizer;

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    fn info(&self) -> RecognizerInfo {
        RecognizerInfo {
            id: "fake-dictation".to_string(),
            name: "Fake".to_string(),
            culture: "en-US".to_string(),
            description: "test recognizer".to_string(),
            supported_audio_formats: vec!["audio/wav".to_string()],
            initial_silence_timeout_ms: None,
            babble_timeout_ms: None,
            end_silence_timeout_ms: 150,
        }
    }

    async fn recognize(&self, _wav_path: &Path) -> VoiceResult<String> {
        Ok("Hello there".to_string())
    }
}

/// Streams a fixed reply in two chunks and counts calls.
#[derive(Default)]
pub struct FakeChat {
    pub calls: AtomicUsize,
    pub last_turns: AtomicUsize,
    pub fail: bool,
}

impl FakeChat {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn stream_completion(&self, messages: &[ChatMessage]) -> VoiceResult<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_turns.store(messages.len(), Ordering::SeqCst);
        if self.fail {
            return Err(VoiceApiError::Upstream("provider down".to_string()));
        }
        let chunks = vec![Ok("Welcome to ".to_string()), Ok("Diamond City.".to_string())];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub state: AppState,
    pub chat: Arc<FakeChat>,
    pub synth: Arc<FakeSynth>,
}

impl Harness {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_chat(api_key, FakeChat::default())
    }

    pub fn with_chat(api_key: Option<&str>, chat: FakeChat) -> Self {
        Self::with_env(api_key, chat, &[])
    }

    /// Extra `(variable, value)` pairs are layered over the defaults.
    pub fn with_env(api_key: Option<&str>, chat: FakeChat, extra: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let api_key = api_key.map(str::to_owned);
        let extra: Vec<(String, String)> = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = Settings::from_lookup(|key| {
            if let Some((_, v)) = extra.iter().find(|(k, _)| k == key) {
                return Some(v.clone());
            }
            match key {
                "SYNTHNET_DATA_DIR" => Some(data_dir.clone()),
                "SYNTHNET_API_KEY" => api_key.clone(),
                _ => None,
            }
        })
        .unwrap();
        settings.ensure_dirs().unwrap();

        std::fs::create_dir_all(settings.log_template.parent().unwrap()).unwrap();
        std::fs::write(&settings.log_template, TEMPLATE).unwrap();
        write_instructions(&settings.instructions_dir, "Fallout4", "Piper");
        write_instructions(&settings.instructions_dir, "Fallout4", "MamaMurphy");

        let chat = Arc::new(chat);
        let synth = Arc::new(FakeSynth::default());
        let services = VoiceServices::with_backends(
            &settings,
            synth.clone(),
            Arc::new(FakeRecognizer),
            chat.clone(),
        );
        let state = Arc::new(KernelState::new(&settings, services));

        Self {
            dir,
            settings,
            state,
            chat,
            synth,
        }
    }

    pub fn router(&self) -> Router {
        synthnet_voice::server::create_router(self.state.clone())
    }

    pub fn npc_log_dir(&self, game: &str, npc: &str) -> PathBuf {
        self.settings.log_dir.join(game).join(npc)
    }

    /// Contents of the only log file for an NPC.
    pub fn read_single_log(&self, game: &str, npc: &str) -> String {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.npc_log_dir(game, npc))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1, "expected one log file, found {:?}", files);
        std::fs::read_to_string(files.remove(0)).unwrap()
    }
}

pub fn write_instructions(root: &Path, game: &str, npc: &str) {
    let dir = root.join(game).join(npc);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("system.txt"), format!("You are {} in {}.", npc, game)).unwrap();
    std::fs::write(dir.join("user.txt"), "Stay in character.").unwrap();
}

/// Send a request and decode the body as JSON (strings come back as `Value::String`).
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A `.wav` with an archive-style name in a directory of its own.
pub fn stray_wave(dir: &Path, name: &str) -> PathBuf {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let path = dir.join(name);
    let mut w = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..800 {
        w.write_sample(((i % 20) as i16 - 10) * 800).unwrap();
    }
    w.finalize().unwrap();
    path
}
