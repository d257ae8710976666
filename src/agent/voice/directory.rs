// SynthNet Voice Directory
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::agent::voice::tts::SpeechSynthesizer;
use crate::error::{VoiceApiError, VoiceResult};

/// One installed synthesizer voice, as reported by the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    pub id: String,
    pub name: String,
    pub culture: String,
    pub gender: String,
    pub age: String,
    pub enabled: bool,
}

/// Read-only view over the voices installed for the active synthesizer.
#[derive(Clone)]
pub struct VoiceDirectory {
    backend: Arc<dyn SpeechSynthesizer>,
}

impl VoiceDirectory {
    pub fn new(backend: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { backend }
    }

    pub async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>> {
        self.backend.list_voices().await
    }

    /// First voice whose id contains `fragment`, ignoring case.
    pub async fn find_voice(&self, fragment: &str) -> VoiceResult<VoiceDescriptor> {
        let voices = self.list_voices().await?;
        find_in(&voices, fragment).cloned()
    }
}

pub fn find_in<'a>(
    voices: &'a [VoiceDescriptor],
    fragment: &str,
) -> VoiceResult<&'a VoiceDescriptor> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return Err(VoiceApiError::InvalidArgument(
            "voice name cannot be empty".to_string(),
        ));
    }
    debug!("[VOICE] Looking up '{}' in {} voices", needle, voices.len());
    voices
        .iter()
        .find(|v| v.id.to_lowercase().contains(&needle))
        .ok_or_else(|| VoiceApiError::NotFound(format!("no installed voice matches '{}'", fragment)))
}
