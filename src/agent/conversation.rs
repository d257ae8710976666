// SynthNet Conversation Session
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{VoiceApiError, VoiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub type ChunkStream = BoxStream<'static, VoiceResult<String>>;

/// An external chat-completion service.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send the full history and return the reply as a lazy sequence of text chunks.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> VoiceResult<ChunkStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// No system instructions yet.
    Uninitialized,
    /// System + user instructions appended.
    Initialized,
    /// Priming example turns appended.
    Trained,
}

/// Ordered, role-tagged turns for one NPC conversation.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    phase: SessionPhase,
    messages: Vec<ChatMessage>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            messages: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn append_system(&mut self, text: &str) {
        self.messages.push(ChatMessage::new(ChatRole::System, text));
        if self.phase == SessionPhase::Uninitialized {
            self.phase = SessionPhase::Initialized;
        }
    }

    pub fn append_user(&mut self, text: &str) -> VoiceResult<()> {
        self.require_initialized()?;
        self.messages.push(ChatMessage::new(ChatRole::User, text));
        Ok(())
    }

    /// Append an example exchange and move to `Trained`. A second call is a no-op.
    pub fn train(&mut self, question: &str, example_answer: &str) -> VoiceResult<bool> {
        match self.phase {
            SessionPhase::Uninitialized => Err(VoiceApiError::InvalidState(
                "cannot train a conversation without system instructions".to_string(),
            )),
            SessionPhase::Trained => Ok(false),
            SessionPhase::Initialized => {
                self.messages.push(ChatMessage::new(ChatRole::User, question));
                self.messages
                    .push(ChatMessage::new(ChatRole::Assistant, example_answer));
                self.phase = SessionPhase::Trained;
                debug!("[NPC] Conversation trained ({} turns)", self.messages.len());
                Ok(true)
            }
        }
    }

    /// Forward the full history to the provider.
    pub async fn stream_completion(&self, provider: &dyn ChatProvider) -> VoiceResult<ChunkStream> {
        self.require_initialized()?;
        provider.stream_completion(&self.messages).await
    }

    /// Stream a reply to completion and record it as an assistant turn.
    pub async fn complete(&mut self, provider: &dyn ChatProvider) -> VoiceResult<String> {
        let mut stream = self.stream_completion(provider).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?);
        }
        info!("[NPC] Provider replied with {} chars", reply.len());
        self.messages
            .push(ChatMessage::new(ChatRole::Assistant, reply.clone()));
        Ok(reply)
    }

    fn require_initialized(&self) -> VoiceResult<()> {
        if self.phase == SessionPhase::Uninitialized {
            return Err(VoiceApiError::InvalidState(
                "conversation has no system instructions".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChatProvider for Echo {
        async fn stream_completion(&self, messages: &[ChatMessage]) -> VoiceResult<ChunkStream> {
            self.seen.lock().unwrap().push(messages.len());
            let chunks = vec![Ok("Hello ".to_string()), Ok("there".to_string())];
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    #[test]
    fn test_phase_transitions() {
        let mut c = ConversationSession::new();
        assert_eq!(c.phase(), SessionPhase::Uninitialized);
        assert!(c.append_user("hi").is_err());
        assert!(c.train("q", "a").is_err());

        c.append_system("You are Piper.");
        assert_eq!(c.phase(), SessionPhase::Initialized);
        c.append_user("Be brief.").unwrap();

        assert!(c.train("What is your name?", "My name is Piper.").unwrap());
        assert_eq!(c.phase(), SessionPhase::Trained);
        assert!(!c.train("What is your name?", "My name is Piper.").unwrap());
        assert_eq!(c.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_uninitialized_never_contacts_provider() {
        let provider = Echo { seen: Mutex::new(vec![]) };
        let mut c = ConversationSession::new();
        let err = c.complete(&provider).await.unwrap_err();
        assert!(matches!(err, VoiceApiError::InvalidState(_)));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_sends_full_history_and_records_reply() {
        let provider = Echo { seen: Mutex::new(vec![]) };
        let mut c = ConversationSession::new();
        c.append_system("sys");
        c.append_user("question").unwrap();

        let reply = c.complete(&provider).await.unwrap();
        assert_eq!(reply, "Hello there");
        assert_eq!(provider.seen.lock().unwrap().as_slice(), &[2]);

        let last = c.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Hello there");
    }
}
