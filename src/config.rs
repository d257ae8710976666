// SynthNet Voice Settings
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Everything configurable is read once at start-up (after dotenv) and then
// shared read-only through AppState.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BIND: &str = "127.0.0.1:5080";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_SESSIONS: usize = 256;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub instructions_dir: PathBuf,
    pub log_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub log_template: PathBuf,
    pub api_key: Option<String>,
    pub default_voice: Option<String>,
    pub tts_program: String,
    pub speak_aloud: bool,
    pub whisper_model: String,
    pub adapter_timeout: Duration,
    pub max_sessions: usize,
    pub session_idle_ttl: Duration,
    pub chat: ChatSettings,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; tests pass a closure over a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = non_empty("SYNTHNET_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("synthnet")
            });

        let bind_raw = non_empty("SYNTHNET_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|e| anyhow::anyhow!("SYNTHNET_BIND '{}' is not a socket address: {}", bind_raw, e))?;

        let secs = |key: &str, default: u64| -> anyhow::Result<Duration> {
            match non_empty(key) {
                Some(v) => {
                    let n: u64 = v
                        .trim()
                        .parse()
                        .map_err(|e| anyhow::anyhow!("{} must be whole seconds: {}", key, e))?;
                    Ok(Duration::from_secs(n.max(1)))
                }
                None => Ok(Duration::from_secs(default)),
            }
        };

        let max_sessions = match non_empty("SYNTHNET_MAX_SESSIONS") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("SYNTHNET_MAX_SESSIONS must be a count: {}", e))?
                .max(1),
            None => DEFAULT_MAX_SESSIONS,
        };

        let speak_aloud = non_empty("SYNTHNET_SPEAK_ALOUD")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            bind,
            instructions_dir: non_empty("SYNTHNET_INSTRUCTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("instructions")),
            log_dir: non_empty("SYNTHNET_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("logs")),
            audio_dir: non_empty("SYNTHNET_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("audio")),
            log_template: non_empty("SYNTHNET_LOG_TEMPLATE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("templates").join("conversation.html")),
            api_key: non_empty("SYNTHNET_API_KEY"),
            default_voice: non_empty("SYNTHNET_DEFAULT_VOICE"),
            tts_program: non_empty("SYNTHNET_TTS_PROGRAM").unwrap_or_else(|| "espeak-ng".to_string()),
            speak_aloud,
            whisper_model: non_empty("SYNTHNET_WHISPER_MODEL").unwrap_or_else(|| "base.en".to_string()),
            adapter_timeout: secs("SYNTHNET_ADAPTER_TIMEOUT_SECS", 30)?,
            max_sessions,
            session_idle_ttl: secs("SYNTHNET_SESSION_IDLE_SECS", 30 * 60)?,
            chat: ChatSettings {
                api_url: non_empty("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
                api_key: non_empty("OPENAI_API_KEY"),
                organization: non_empty("OPENAI_ORGANIZATION"),
                model: non_empty("OPENAI_MODEL_NAME").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout: secs("SYNTHNET_CHAT_TIMEOUT_SECS", 60)?,
            },
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    /// Create the data directories the service writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.instructions_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(&self.audio_dir)?;
        Ok(())
    }

    pub fn log_summary(&self) {
        info!("[CONFIG] bind={}", self.bind);
        info!("[CONFIG] instructions={:?}", self.instructions_dir);
        info!("[CONFIG] logs={:?} template={:?}", self.log_dir, self.log_template);
        info!("[CONFIG] audio={:?}", self.audio_dir);
        info!(
            "[CONFIG] tts={} whisper={} timeout={:?}",
            self.tts_program, self.whisper_model, self.adapter_timeout
        );
        info!(
            "[CONFIG] chat model={} url={} key={}",
            self.chat.model,
            self.chat.api_url,
            if self.chat.api_key.is_some() { "set" } else { "missing" }
        );
        info!(
            "[CONFIG] sessions max={} idle={:?}",
            self.max_sessions, self.session_idle_ttl
        );
        if self.api_key.is_some() {
            info!("[CONFIG] API key authentication enabled");
        }
    }
}
