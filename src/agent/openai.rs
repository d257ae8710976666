// SynthNet Chat Bridge
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Streaming client for any OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::agent::conversation::{ChatMessage, ChatProvider, ChunkStream};
use crate::config::ChatSettings;
use crate::error::{VoiceApiError, VoiceResult};

pub struct OpenAiChatProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    organization: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiChatProvider {
    pub fn new(settings: &ChatSettings) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                error!("[CHAT] Could not build HTTP client: {}", e);
                VoiceApiError::Upstream(format!("chat client: {}", e))
            })?;
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            organization: settings.organization.clone(),
            model: settings.model.clone(),
            timeout: settings.timeout,
        })
    }

    /// Whole-request budget applied to every completion.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn stream_completion(&self, messages: &[ChatMessage]) -> VoiceResult<ChunkStream> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            VoiceApiError::Upstream("OPENAI_API_KEY is not configured".to_string())
        })?;

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        let endpoint = format!("{}/chat/completions", self.api_url.trim_end_matches('/'));
        info!("[CHAT] {} turns -> {} ({})", messages.len(), endpoint, self.model);

        let mut request = self.client.post(&endpoint).bearer_auth(api_key).json(&payload);
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request.send().await.map_err(|e| {
            error!("[CHAT] Connection failed: {}", e);
            VoiceApiError::Upstream(format!("chat request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceApiError::Upstream(format!("API Error: {} {}", status, body)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(delta_stream(bytes))
    }
}

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental decoder for `data: {...}` server-sent-event lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(json) => {
                    if let Some(text) = json["choices"][0]["delta"]["content"].as_str() {
                        if !text.is_empty() {
                            events.push(SseEvent::Delta(text.to_string()));
                        }
                    }
                }
                Err(e) => debug!("[CHAT] Skipping malformed event: {}", e),
            }
        }
        events
    }
}

struct DeltaState {
    inner: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

fn delta_stream(inner: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ChunkStream {
    let state = DeltaState {
        inner,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.push(&bytes) {
                        match event {
                            SseEvent::Delta(text) => st.pending.push_back(text),
                            SseEvent::Done => st.done = true,
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((
                        Err(VoiceApiError::Upstream(format!("chat stream broke: {}", e))),
                        st,
                    ));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}
