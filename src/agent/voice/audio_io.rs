// SynthNet Audio Output
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Speaker playback of rendered wave files

use std::fs::File;
use std::path::Path;

use tracing::info;

use crate::error::{VoiceApiError, VoiceResult};

/// Plays wave files on the host's default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayer;

impl AudioPlayer {
    pub fn new() -> Self {
        Self
    }

    /// Play audio file through speakers. Resolves once playback has finished.
    pub async fn play_file(&self, audio_path: &Path) -> VoiceResult<()> {
        use rodio::{Decoder, OutputStream, Sink};

        info!("[VOICE] Playing {:?}...", audio_path);
        let audio_path = audio_path.to_path_buf();

        // rodio's output stream is not Send; keep it on one blocking thread
        tokio::task::spawn_blocking(move || {
            let (_stream, stream_handle) = OutputStream::try_default()
                .map_err(|e| VoiceApiError::Upstream(format!("no audio output device: {}", e)))?;
            let sink = Sink::try_new(&stream_handle)
                .map_err(|e| VoiceApiError::Upstream(format!("audio sink: {}", e)))?;

            let file = File::open(&audio_path)
                .map_err(|e| VoiceApiError::from_io(e, format!("{:?}", audio_path)))?;
            let source = Decoder::new(std::io::BufReader::new(file))
                .map_err(|e| VoiceApiError::Upstream(format!("decode {:?}: {}", audio_path, e)))?;

            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        })
        .await?
    }
}
