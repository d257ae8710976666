// SynthNet Voice Core
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// The service kernel behind both the HTTP surface and the CLI. Every
// dependency is injected at construction; per-caller state lives in the
// session registry, never in fields shared by all callers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::agent::conversation::ChatProvider;
use crate::agent::instructions::{Instruction, InstructionStore};
use crate::agent::npc::{NpcStage, SessionLimits, SessionRegistry};
use crate::agent::openai::OpenAiChatProvider;
use crate::agent::scribe::{
    resolve_audio_path, ArchiveFileName, AudioArchive, ConversationLog, Transcription,
};
use crate::agent::voice::{
    CommandSynthesizer, RecognitionAdapter, RecognizerInfo, SpeechRecognizer, SpeechSynthesizer,
    SynthesisAdapter, VoiceDescriptor, WhisperRecognizer,
};
use crate::config::Settings;
use crate::error::{VoiceApiError, VoiceResult};
use crate::game::GameIdentity;

const MAX_ACTIVITY_LINES: usize = 200;
pub const PLAYER_SPEAKER: &str = "Player";

#[derive(Debug, Clone)]
pub struct PromptOptions {
    pub question: String,
    pub scribe: bool,
    pub gpt: bool,
}

/// The services a VoiceCore is built from.
pub struct VoiceServices {
    pub instructions: InstructionStore,
    pub synthesizer: SynthesisAdapter,
    pub recognizer: RecognitionAdapter,
    pub chat: Arc<dyn ChatProvider>,
    pub log: ConversationLog,
    pub archive: AudioArchive,
    pub speak_aloud: bool,
    pub session_limits: SessionLimits,
}

impl VoiceServices {
    /// Production wiring: espeak-ng, Whisper and an OpenAI-compatible chat endpoint.
    pub fn from_settings(settings: &Settings) -> VoiceResult<Self> {
        let synth: Arc<dyn SpeechSynthesizer> =
            Arc::new(CommandSynthesizer::new(settings.tts_program.clone()));
        let recognizer: Arc<dyn SpeechRecognizer> =
            Arc::new(WhisperRecognizer::new(settings.whisper_model.clone()));
        let chat = Arc::new(OpenAiChatProvider::new(&settings.chat)?);
        Ok(Self::with_backends(settings, synth, recognizer, chat))
    }

    pub fn with_backends(
        settings: &Settings,
        synth: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            instructions: InstructionStore::new(settings.instructions_dir.clone()),
            synthesizer: SynthesisAdapter::new(
                synth,
                settings.adapter_timeout,
                settings.default_voice.clone(),
            ),
            recognizer: RecognitionAdapter::new(recognizer, settings.adapter_timeout),
            chat,
            log: ConversationLog::new(settings.log_dir.clone(), settings.log_template.clone()),
            archive: AudioArchive::new(settings.audio_dir.clone()),
            speak_aloud: settings.speak_aloud,
            session_limits: SessionLimits {
                max_sessions: settings.max_sessions,
                idle_ttl: settings.session_idle_ttl,
            },
        }
    }
}

pub struct VoiceCore {
    services: VoiceServices,
    sessions: SessionRegistry,
    activity: Mutex<VecDeque<String>>,
}

impl VoiceCore {
    pub fn new(services: VoiceServices) -> Self {
        Self {
            sessions: SessionRegistry::with_limits(services.session_limits),
            services,
            activity: Mutex::new(VecDeque::from(vec![
                "[SYSTEM] SynthNet core initialized.".to_string()
            ])),
        }
    }

    // --- Activity ---

    pub fn log(&self, msg: &str) {
        info!("{}", msg);
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        if activity.len() == MAX_ACTIVITY_LINES {
            activity.pop_front();
        }
        activity.push_back(msg.to_string());
    }

    pub fn recent_activity(&self, limit: usize) -> Vec<String> {
        let activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        let skip = activity.len().saturating_sub(limit);
        activity.iter().skip(skip).cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn services(&self) -> &VoiceServices {
        &self.services
    }

    // --- NPC ---

    pub async fn init_npc(&self, session_key: &str, identity: GameIdentity) -> VoiceResult<Instruction> {
        let session = self.sessions.get_or_create(session_key);
        let mut session = session.lock().await;
        session.select(identity.clone());
        let instruction = session.init(&self.services.instructions).await?;
        self.log(&format!("[NPC] ✅ {} ready for prompts", identity));
        Ok(instruction)
    }

    pub async fn get_instruction(&self, identity: &GameIdentity) -> VoiceResult<Instruction> {
        self.services.instructions.get_instruction(identity).await
    }

    pub async fn session_stage(&self, session_key: &str) -> NpcStage {
        match self.sessions.get(session_key) {
            Some(session) => session.lock().await.stage(),
            None => NpcStage::Unvalidated,
        }
    }

    pub fn close_session(&self, session_key: &str) -> bool {
        let removed = self.sessions.remove(session_key);
        if removed {
            self.log(&format!("[NPC] Session '{}' closed", session_key));
        }
        removed
    }

    /// Answer a question as the NPC, render the answer and optionally scribe it.
    pub async fn prompt(
        &self,
        session_key: &str,
        identity: GameIdentity,
        options: PromptOptions,
    ) -> VoiceResult<Transcription> {
        let session = self.sessions.get_or_create(session_key);
        let mut session = session.lock().await;
        session.select(identity.clone());

        let reply = session
            .answer(&options.question, options.gpt, self.services.chat.as_ref())
            .await?;
        let voice = session.voice().map(str::to_owned);

        let mut script = Transcription::new(reply, &identity);
        match self
            .services
            .archive
            .archive(&identity, &script.text, &self.services.synthesizer, voice.as_deref())
            .await
        {
            Ok(clip) => {
                script.attach_audio(&clip);
                if self.services.speak_aloud {
                    if let Err(e) = self.services.synthesizer.play_file(&clip.path).await {
                        warn!("[NPC] Playback failed: {}", e);
                    }
                }
            }
            Err(e) => warn!("[NPC] Audio rendering failed for {}: {}", identity, e),
        }

        if options.scribe {
            self.scribe_turn(&identity, &options.question, &script).await;
        }

        Ok(script)
    }

    async fn scribe_turn(&self, identity: &GameIdentity, question: &str, script: &Transcription) {
        let log = &self.services.log;
        if !question.trim().is_empty() {
            let mut asked = Transcription::new(question.trim(), identity);
            asked.player = Some(PLAYER_SPEAKER.to_string());
            if let Err(e) = log.log_conversation(identity, &asked).await {
                warn!("[SCRIBE] Could not log question: {}", e);
                return;
            }
        }
        match log.log_conversation(identity, script).await {
            Ok(_) => self.log(&format!("[NPC] {}: {}", identity.npc_name, script.text)),
            Err(e) => warn!("[SCRIBE] Could not log reply: {}", e),
        }
    }

    // --- Audio ---

    /// Transcribe a wave file. Archived file names also identify the NPC,
    /// in which case the text is appended to that NPC's log.
    pub async fn transcribe(&self, file_path: &str) -> VoiceResult<Transcription> {
        let path = resolve_audio_path(self.services.archive.root(), file_path)?;
        let text = self.services.recognizer.recognize(&path).await?;

        let mut script = Transcription {
            text,
            audio_file_path: path.parent().map(|p| p.to_string_lossy().into_owned()),
            audio_file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let identity = script
            .audio_file_name
            .as_deref()
            .and_then(ArchiveFileName::parse)
            .and_then(|name| name.identity());
        if let Some(identity) = identity {
            script.game_name = Some(identity.game_name);
            script.npc_name = Some(identity.npc_name.clone());
            if let Err(e) = self.services.log.log_conversation(&identity, &script).await {
                warn!("[SCRIBE] Could not log transcription: {}", e);
            }
        }

        self.log(&format!("[STT] {:?} -> {} chars", path, script.text.len()));
        Ok(script)
    }

    /// Render `script.text` into the archive for `identity`.
    pub async fn create_audio(
        &self,
        session_key: &str,
        identity: GameIdentity,
        mut script: Transcription,
    ) -> VoiceResult<Transcription> {
        if script.text.trim().is_empty() {
            return Err(VoiceApiError::InvalidArgument("text is required".to_string()));
        }
        let voice = self.session_voice(session_key).await;
        let clip = self
            .services
            .archive
            .archive(&identity, &script.text, &self.services.synthesizer, voice.as_deref())
            .await?;
        script.attach_audio(&clip);
        script.game_name = Some(identity.game_name);
        script.npc_name = Some(identity.npc_name);
        Ok(script)
    }

    pub async fn log_conversation(
        &self,
        identity: &GameIdentity,
        script: &Transcription,
    ) -> VoiceResult<PathBuf> {
        self.services.log.log_conversation(identity, script).await
    }

    /// Speak text with the caller's voice on the host output. Returns the spoken text.
    pub async fn player_prompt(&self, session_key: &str, question: &str, scribe: bool) -> VoiceResult<String> {
        let text = if question.trim().is_empty() {
            "I have nothing to say!".to_string()
        } else {
            question.trim().to_string()
        };
        let voice = self.session_voice(session_key).await;
        self.services.synthesizer.speak(&text, voice.as_deref()).await?;
        if scribe {
            self.log(&format!("[PLAYER] {}", text));
        }
        Ok(text)
    }

    // --- Voices ---

    pub async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>> {
        self.services.synthesizer.directory().list_voices().await
    }

    /// Find a voice by fragment and make it the session's active voice.
    pub async fn select_voice(&self, session_key: &str, fragment: &str) -> VoiceResult<VoiceDescriptor> {
        let voice = self.services.synthesizer.directory().find_voice(fragment).await?;
        let session = self.sessions.get_or_create(session_key);
        session.lock().await.set_voice(Some(voice.id.clone()));
        self.log(&format!("[VOICE] Session '{}' speaks as {}", session_key, voice.id));
        Ok(voice)
    }

    pub fn recognizer_info(&self) -> RecognizerInfo {
        self.services.recognizer.info()
    }

    /// Voice selected by an existing session. Never creates one.
    async fn session_voice(&self, session_key: &str) -> Option<String> {
        let session = self.sessions.get(session_key)?;
        let session = session.lock().await;
        session.voice().map(str::to_owned)
    }

    pub fn audio_root(&self) -> &Path {
        self.services.archive.root()
    }
}
