// SynthNet Synthesis Adapter
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::io_shield::AtomicMover;
use crate::agent::voice::audio_io::AudioPlayer;
use crate::agent::voice::directory::{VoiceDescriptor, VoiceDirectory};
use crate::agent::voice::wav::{self, WavSummary};
use crate::error::{VoiceApiError, VoiceResult};

/// A text-to-speech engine. Implementations may accept only one request at a
/// time; `SynthesisAdapter` takes care of serialising calls.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn engine_name(&self) -> &str;

    async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>>;

    /// Render `text` into a PCM wave file at `output`. Any PCM layout is accepted.
    async fn render(&self, text: &str, voice: Option<&str>, output: &Path) -> VoiceResult<()>;
}

/// Drives an `espeak-ng` compatible command line synthesizer.
pub struct CommandSynthesizer {
    program: String,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn engine_name(&self) -> &str {
        &self.program
    }

    async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VoiceApiError::Upstream(format!("failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(VoiceApiError::Upstream(format!(
                "{} --voices exited with {:?}",
                self.program,
                output.status.code()
            )));
        }

        Ok(parse_espeak_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn render(&self, text: &str, voice: Option<&str>, output: &Path) -> VoiceResult<()> {
        let mut cmd = Command::new(&self.program);
        if let Some(voice) = voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("-w")
            .arg(output)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("[TTS] {} -> {:?} (voice: {:?})", self.program, output, voice);

        let mut child = cmd
            .spawn()
            .map_err(|e| VoiceApiError::Upstream(format!("failed to execute {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!("[TTS] {} failed: {}", self.program, stderr);
            return Err(VoiceApiError::Upstream(format!(
                "{} exited with {:?}: {}",
                self.program,
                result.status.code(),
                stderr
            )));
        }
        Ok(())
    }
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US           (en 5)
/// ```
pub fn parse_espeak_voices(listing: &str) -> Vec<VoiceDescriptor> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let (age, gender) = cols[2].split_once('/').unwrap_or(("--", cols[2]));
            Some(VoiceDescriptor {
                id: cols[3].to_string(),
                name: cols[3].replace('_', " "),
                culture: cols[1].to_string(),
                gender: match gender {
                    "M" => "Male",
                    "F" => "Female",
                    _ => "NotSet",
                }
                .to_string(),
                age: if age == "--" { "NotSet".to_string() } else { age.to_string() },
                enabled: true,
            })
        })
        .collect()
}

/// Serialises access to one synthesizer and bounds every call with a timeout.
pub struct SynthesisAdapter {
    backend: Arc<dyn SpeechSynthesizer>,
    engine_lock: Mutex<()>,
    output_lock: Mutex<()>,
    timeout: Duration,
    default_voice: Option<String>,
    player: AudioPlayer,
}

impl SynthesisAdapter {
    pub fn new(
        backend: Arc<dyn SpeechSynthesizer>,
        timeout: Duration,
        default_voice: Option<String>,
    ) -> Self {
        Self {
            backend,
            engine_lock: Mutex::new(()),
            output_lock: Mutex::new(()),
            timeout,
            default_voice,
            player: AudioPlayer::new(),
        }
    }

    pub fn directory(&self) -> VoiceDirectory {
        VoiceDirectory::new(self.backend.clone())
    }

    pub fn engine_name(&self) -> &str {
        self.backend.engine_name()
    }

    /// A session's explicit choice wins, then the configured default, then the engine's own.
    pub fn resolve_voice<'a>(&'a self, voice: Option<&'a str>) -> Option<&'a str> {
        voice.or(self.default_voice.as_deref())
    }

    /// Render `text` to `path` in the fixed archive format (22050 Hz, 16-bit, mono).
    pub async fn synthesize_to_file(
        &self,
        text: &str,
        voice: Option<&str>,
        path: &Path,
    ) -> VoiceResult<WavSummary> {
        if text.trim().is_empty() {
            return Err(VoiceApiError::InvalidArgument(
                "nothing to synthesize".to_string(),
            ));
        }
        let voice = self.resolve_voice(voice);
        let raw = raw_path_for(path);

        let _guard = self.engine_lock.lock().await;
        info!("[TTS] Rendering {} chars -> {:?}", text.len(), path);

        let rendered = tokio::time::timeout(self.timeout, self.backend.render(text, voice, &raw)).await;
        match rendered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = std::fs::remove_file(&raw);
                return Err(e);
            }
            Err(_) => {
                let _ = std::fs::remove_file(&raw);
                return Err(VoiceApiError::Timeout(format!(
                    "synthesis exceeded {:?}",
                    self.timeout
                )));
            }
        }

        let final_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let tmp = AtomicMover::tmp_path_for(&final_path);
            let result = wav::normalize_to_archive(&raw, &tmp)
                .and_then(|summary| {
                    AtomicMover::commit(&tmp, &final_path)?;
                    Ok(summary)
                });
            let _ = std::fs::remove_file(&raw);
            if result.is_err() {
                let _ = std::fs::remove_file(&tmp);
            }
            result
        })
        .await?
    }

    /// Render `text` and play it on the host's default output device.
    pub async fn speak(&self, text: &str, voice: Option<&str>) -> VoiceResult<WavSummary> {
        let scratch = std::env::temp_dir().join(format!("synthnet-speak-{}.wav", Uuid::new_v4()));
        let summary = self.synthesize_to_file(text, voice, &scratch).await?;
        let played = self.play_within(&scratch, summary.duration_ms).await;
        let _ = tokio::fs::remove_file(&scratch).await;
        played.map(|_| summary)
    }

    /// Play an already rendered wave file. One clip plays at a time.
    pub async fn play_file(&self, path: &Path) -> VoiceResult<()> {
        let path_owned = path.to_path_buf();
        let summary = tokio::task::spawn_blocking(move || wav::summarize(&path_owned)).await??;
        self.play_within(path, summary.duration_ms).await
    }

    async fn play_within(&self, path: &Path, duration_ms: u64) -> VoiceResult<()> {
        let _output = self.output_lock.lock().await;
        let budget = self.timeout + Duration::from_millis(duration_ms);
        match tokio::time::timeout(budget, self.player.play_file(path)).await {
            Ok(result) => result,
            Err(_) => Err(VoiceApiError::Timeout(format!("playback exceeded {:?}", budget))),
        }
    }
}

fn raw_path_for(final_path: &Path) -> PathBuf {
    let mut raw = final_path.as_os_str().to_owned();
    raw.push(".raw.synthnet_tmp");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LISTING: &str = "Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-gb           --/F      English_(Jane)     gmw/en
 2  en-us           30/M      English_(America)  gmw/en-US           (en 3)
";

    #[test]
    fn test_parse_espeak_listing() {
        let voices = parse_espeak_voices(LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].id, "English_(Jane)");
        assert_eq!(voices[1].name, "English (Jane)");
        assert_eq!(voices[1].gender, "Female");
        assert_eq!(voices[1].age, "NotSet");
        assert_eq!(voices[2].culture, "en-us");
        assert_eq!(voices[2].age, "30");
    }

    /// Writes a short 8 kHz stereo tone and counts concurrent renders.
    struct ToneSynth {
        active: AtomicUsize,
        max_seen: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SpeechSynthesizer for ToneSynth {
        fn engine_name(&self) -> &str {
            "tone"
        }

        async fn list_voices(&self) -> VoiceResult<Vec<VoiceDescriptor>> {
            Ok(vec![])
        }

        async fn render(&self, _text: &str, _voice: Option<&str>, output: &Path) -> VoiceResult<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut w = hound::WavWriter::create(output, spec)?;
            for i in 0..8000 {
                let s = ((i % 40) as i16 - 20) * 500;
                w.write_sample(s)?;
                w.write_sample(s)?;
            }
            w.finalize()?;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tone(delay_ms: u64) -> Arc<ToneSynth> {
        Arc::new(ToneSynth {
            active: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn test_synthesize_normalises_format() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = SynthesisAdapter::new(tone(0), Duration::from_secs(5), None);
        let out = dir.path().join("line.wav");

        let summary = adapter.synthesize_to_file("Hello", None, &out).await.unwrap();
        assert_eq!(summary.sample_rate, 22050);
        assert_eq!(summary.duration_ms, 1000);

        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec(), wav::archive_spec());
        assert!(!raw_path_for(&out).exists());
    }

    #[tokio::test]
    async fn test_one_render_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let synth = tone(30);
        let adapter = Arc::new(SynthesisAdapter::new(synth.clone(), Duration::from_secs(5), None));

        let mut handles = Vec::new();
        for i in 0..4 {
            let adapter = adapter.clone();
            let path = dir.path().join(format!("{}.wav", i));
            handles.push(tokio::spawn(async move {
                adapter.synthesize_to_file("line", None, &path).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(synth.max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = SynthesisAdapter::new(tone(500), Duration::from_millis(20), None);
        let err = adapter
            .synthesize_to_file("slow", None, &dir.path().join("slow.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceApiError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = SynthesisAdapter::new(tone(0), Duration::from_secs(1), None);
        let err = adapter
            .synthesize_to_file("   ", None, &dir.path().join("x.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceApiError::InvalidArgument(_)));
    }

    #[test]
    fn test_voice_resolution_order() {
        let adapter = SynthesisAdapter::new(tone(0), Duration::from_secs(1), Some("david".into()));
        assert_eq!(adapter.resolve_voice(Some("jane")), Some("jane"));
        assert_eq!(adapter.resolve_voice(None), Some("david"));
    }
}
