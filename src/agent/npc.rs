// SynthNet NPC Sessions
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// One NpcSession per logical caller (session id header, else game/npc pair).
// Nothing here is process-global: the registry hands out a lock per session.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::agent::conversation::{ChatProvider, ConversationSession, SessionPhase};
use crate::agent::instructions::{Instruction, InstructionStore};
use crate::error::{VoiceApiError, VoiceResult};
use crate::game::GameIdentity;

pub const TRAINING_QUESTION: &str = "What is your name?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NpcStage {
    Unvalidated,
    Validated,
    Initialized,
    Trained,
}

#[derive(Debug, Default)]
pub struct NpcSession {
    identity: Option<GameIdentity>,
    conversation: ConversationSession,
    instruction: Option<Instruction>,
    voice: Option<String>,
}

impl NpcSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> NpcStage {
        match (&self.identity, self.conversation.phase()) {
            (None, _) => NpcStage::Unvalidated,
            (Some(_), SessionPhase::Uninitialized) => NpcStage::Validated,
            (Some(_), SessionPhase::Initialized) => NpcStage::Initialized,
            (Some(_), SessionPhase::Trained) => NpcStage::Trained,
        }
    }

    pub fn identity(&self) -> Option<&GameIdentity> {
        self.identity.as_ref()
    }

    pub fn conversation(&self) -> &ConversationSession {
        &self.conversation
    }

    pub fn instruction(&self) -> Option<&Instruction> {
        self.instruction.as_ref()
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn set_voice(&mut self, voice: Option<String>) {
        self.voice = voice;
    }

    /// Move to `Validated` for `identity`. Switching NPC starts a fresh conversation.
    pub fn select(&mut self, identity: GameIdentity) {
        if self.identity.as_ref() == Some(&identity) {
            return;
        }
        debug!("[NPC] Session now voices {}", identity);
        self.identity = Some(identity);
        self.conversation = ConversationSession::new();
        self.instruction = None;
    }

    /// Load the NPC's instructions into a fresh conversation (`Validated` → `Initialized`).
    pub async fn init(&mut self, store: &InstructionStore) -> VoiceResult<Instruction> {
        let identity = self.identity.clone().ok_or_else(|| {
            VoiceApiError::InvalidState("validate gameName and npcName before init".to_string())
        })?;

        self.conversation = ConversationSession::new();
        self.instruction = None;

        let instruction = store.get_instruction(&identity).await?;
        self.conversation.append_system(&instruction.from_system);
        self.conversation.append_user(&instruction.from_user)?;
        self.instruction = Some(instruction.clone());

        info!("[NPC] {} initialized", identity);
        Ok(instruction)
    }

    /// Produce the NPC's reply text for `question`.
    ///
    /// Without `gpt` the question is echoed back. With `gpt` the session must
    /// be initialized; training turns are appended once.
    pub async fn answer(
        &mut self,
        question: &str,
        gpt: bool,
        provider: &dyn ChatProvider,
    ) -> VoiceResult<String> {
        let npc = self
            .identity
            .as_ref()
            .map(|id| id.npc_name.clone())
            .ok_or_else(|| VoiceApiError::InvalidState("no NPC selected".to_string()))?;

        let question = question.trim();
        if question.is_empty() {
            return Ok(format!(
                "You have not prepared any question for {}. Set npcName, gameName and type in your question.",
                npc
            ));
        }
        if !gpt {
            return Ok(format!("Your prepared question for {}: {}", npc, question));
        }
        if self.conversation.phase() == SessionPhase::Uninitialized {
            return Err(VoiceApiError::InvalidState(format!(
                "You have not yet set instructions for the {}! Set instruction through POST npc/init.",
                npc
            )));
        }

        let checkpoint = self.conversation.clone();
        let result = self.ask_trained(&npc, question, provider).await;
        if result.is_err() {
            self.conversation = checkpoint;
        }
        result
    }

    async fn ask_trained(
        &mut self,
        npc: &str,
        question: &str,
        provider: &dyn ChatProvider,
    ) -> VoiceResult<String> {
        self.conversation
            .train(TRAINING_QUESTION, &format!("My name is {}.", npc))?;
        self.conversation.append_user(question)?;
        self.conversation.complete(provider).await
    }
}

/// Bounds on how many sessions the registry keeps and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

struct SessionEntry {
    session: Arc<AsyncMutex<NpcSession>>,
    last_used: Instant,
    // Ordering for LRU eviction; Instants can tie.
    tick: u64,
}

impl SessionEntry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    tick: u64,
}

/// Per-caller sessions. Different keys never share state.
///
/// Idle sessions expire after `idle_ttl`; when `max_sessions` is reached the
/// least recently used idle session is dropped. Sessions a request is
/// currently holding are never evicted.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
    limits: SessionLimits,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            limits: SessionLimits {
                max_sessions: limits.max_sessions.max(1),
                idle_ttl: limits.idle_ttl,
            },
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Look up an existing session without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<AsyncMutex<NpcSession>>> {
        let mut guard = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let sessions = &mut *guard;
        let now = Instant::now();

        let fresh = {
            let entry = sessions.entries.get(key)?;
            entry.in_use() || now.duration_since(entry.last_used) < self.limits.idle_ttl
        };
        if !fresh {
            debug!("[NPC] Session '{}' expired", key);
            sessions.entries.remove(key);
            return None;
        }

        sessions.tick += 1;
        let entry = sessions.entries.get_mut(key)?;
        entry.last_used = now;
        entry.tick = sessions.tick;
        Some(entry.session.clone())
    }

    pub fn get_or_create(&self, key: &str) -> Arc<AsyncMutex<NpcSession>> {
        if let Some(session) = self.get(key) {
            return session;
        }
        let mut guard = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let sessions = &mut *guard;
        let now = Instant::now();
        self.evict(sessions, now);

        sessions.tick += 1;
        let tick = sessions.tick;
        sessions
            .entries
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("[NPC] New session '{}'", key);
                SessionEntry {
                    session: Arc::new(AsyncMutex::new(NpcSession::new())),
                    last_used: now,
                    tick,
                }
            })
            .session
            .clone()
    }

    /// Make room for one more session.
    fn evict(&self, sessions: &mut Sessions, now: Instant) {
        let ttl = self.limits.idle_ttl;
        let before = sessions.entries.len();
        sessions
            .entries
            .retain(|_, entry| entry.in_use() || now.duration_since(entry.last_used) < ttl);
        let expired = before - sessions.entries.len();
        if expired > 0 {
            debug!("[NPC] Expired {} idle session(s)", expired);
        }

        while sessions.entries.len() >= self.limits.max_sessions {
            let oldest = sessions
                .entries
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.tick)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("[NPC] Session cap reached, dropping '{}'", key);
                    sessions.entries.remove(&key);
                }
                None => {
                    warn!(
                        "[NPC] All {} sessions busy; exceeding cap",
                        sessions.entries.len()
                    );
                    break;
                }
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
