// SynthNet Scribe: Conversation Logs & Audio Archive
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Layout under the configured roots:
//   <logs>/<Game>/<Npc>/<YYYY-MM-DD>.html
//   <audio>/<Game>/<Npc>/<index>_<Npc>_<Game>.wav
//   <audio>/<Game>/<Npc>/metadata.csv        (filename|text|text)
//
// Writers are serialised per directory / per file, never per process.

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::agent::io_shield::AtomicMover;
use crate::agent::voice::tts::SynthesisAdapter;
use crate::agent::voice::wav::WavSummary;
use crate::error::{VoiceApiError, VoiceResult};
use crate::game::{GameIdentity, GameName};

pub const TEXT_PLACEHOLDER: &str = "{{__TEXT__}}";
pub const NEXT_MARKER: &str = "<!--__NEXT__-->";
pub const METADATA_FILE: &str = "metadata.csv";

/// One utterance and its paired audio asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcription {
    pub text: String,
    /// Directory holding the audio file.
    pub audio_file_path: Option<String>,
    pub audio_file_name: Option<String>,
    pub player: Option<String>,
    pub game_name: Option<GameName>,
    pub npc_name: Option<String>,
}

impl Transcription {
    pub fn new(text: impl Into<String>, identity: &GameIdentity) -> Self {
        Self {
            text: text.into(),
            game_name: Some(identity.game_name),
            npc_name: Some(identity.npc_name.clone()),
            ..Default::default()
        }
    }

    pub fn attach_audio(&mut self, clip: &ArchivedClip) {
        self.audio_file_path = clip
            .path
            .parent()
            .map(|p| p.to_string_lossy().into_owned());
        self.audio_file_name = Some(clip.file_name.clone());
    }

    /// Full path of the paired audio file, if both halves are known.
    pub fn audio_path(&self) -> Option<PathBuf> {
        match (&self.audio_file_path, &self.audio_file_name) {
            (Some(dir), Some(name)) => Some(Path::new(dir).join(name)),
            _ => None,
        }
    }
}

/// Async locks keyed by path.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub async fn lock(&self, key: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// Conversation log
// ---------------------------------------------------------------------------

pub struct ConversationLog {
    root: PathBuf,
    template: PathBuf,
    locks: PathLocks,
}

impl ConversationLog {
    pub fn new(root: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: template.into(),
            locks: PathLocks::default(),
        }
    }

    pub fn log_path(&self, identity: &GameIdentity, date: NaiveDate) -> PathBuf {
        self.root
            .join(identity.game_name.as_str())
            .join(&identity.npc_name)
            .join(format!("{}.html", date.format("%Y-%m-%d")))
    }

    /// Append `transcription` to today's log for `identity`; returns the log file path.
    pub async fn log_conversation(
        &self,
        identity: &GameIdentity,
        transcription: &Transcription,
    ) -> VoiceResult<PathBuf> {
        let now = Local::now();
        self.log_conversation_at(identity, transcription, now.date_naive(), now.time())
            .await
    }

    pub async fn log_conversation_at(
        &self,
        identity: &GameIdentity,
        transcription: &Transcription,
        date: NaiveDate,
        time: NaiveTime,
    ) -> VoiceResult<PathBuf> {
        if !self.root.is_dir() {
            return Err(VoiceApiError::NotFound(format!(
                "log directory {:?}",
                self.root
            )));
        }

        let path = self.log_path(identity, date);
        let entry = render_entry(identity, transcription, time);
        let _guard = self.locks.lock(&path).await;

        let template = self.template.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || append_entry(&target, &template, &entry)).await??;

        info!("[SCRIBE] {} -> {:?}", identity, path);
        Ok(path)
    }
}

fn append_entry(path: &Path, template: &Path, entry: &str) -> VoiceResult<()> {
    let content = if path.exists() {
        let mut existing = fs::read_to_string(path)?;
        match existing.find(NEXT_MARKER) {
            Some(pos) => existing.insert_str(pos, entry),
            None => existing.push_str(entry),
        }
        existing
    } else {
        let template = fs::read_to_string(template)
            .map_err(|e| VoiceApiError::from_io(e, format!("log template {:?}", template)))?;
        let body = format!("{}{}", entry, NEXT_MARKER);
        if template.contains(TEXT_PLACEHOLDER) {
            template.replacen(TEXT_PLACEHOLDER, &body, 1)
        } else {
            format!("{}{}", template, body)
        }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    AtomicMover::write(path, content.as_bytes())?;
    Ok(())
}

fn render_entry(identity: &GameIdentity, t: &Transcription, time: NaiveTime) -> String {
    let speaker = t.player.as_deref().unwrap_or(&identity.npc_name);
    let audio = t
        .audio_file_name
        .as_deref()
        .map(|name| format!(" <span class=\"audio\">{}</span>", escape_html(name)))
        .unwrap_or_default();
    format!(
        "<p class=\"turn\"><span class=\"time\">{}</span> <b>{}</b>: {}{}</p>\n",
        time.format("%H:%M:%S"),
        escape_html(speaker),
        escape_html(t.text.trim()),
        audio
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br/>"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Audio archive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ArchivedClip {
    pub path: PathBuf,
    pub file_name: String,
    pub index: u32,
    pub format: WavSummary,
}

/// `00042_MamaMurphy_Fallout4.wav`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFileName {
    pub index: u32,
    pub npc_name: String,
    pub game_name: GameName,
}

impl ArchiveFileName {
    pub fn render(&self) -> String {
        format!("{:05}_{}_{}.wav", self.index, self.npc_name, self.game_name)
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".wav")?;
        let mut parts = stem.split('_');
        let index = parts.next()?.parse().ok()?;
        let npc_name = parts.next()?.to_string();
        let game_name = parts.next()?.parse().ok()?;
        if parts.next().is_some() || npc_name.is_empty() {
            return None;
        }
        Some(Self {
            index,
            npc_name,
            game_name,
        })
    }

    pub fn identity(&self) -> Option<GameIdentity> {
        GameIdentity::new(self.game_name.as_str(), &self.npc_name).ok()
    }
}

pub struct AudioArchive {
    root: PathBuf,
    locks: PathLocks,
}

impl AudioArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: PathLocks::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn npc_dir(&self, identity: &GameIdentity) -> PathBuf {
        self.root
            .join(identity.game_name.as_str())
            .join(&identity.npc_name)
    }

    /// Render `text` into the next free archive slot and record it in `metadata.csv`.
    pub async fn archive(
        &self,
        identity: &GameIdentity,
        text: &str,
        synthesizer: &SynthesisAdapter,
        voice: Option<&str>,
    ) -> VoiceResult<ArchivedClip> {
        let dir = self.npc_dir(identity);
        tokio::fs::create_dir_all(&dir).await?;

        let name = self.reserve(&dir, identity).await?;
        let file_name = name.render();
        let path = dir.join(&file_name);

        let format = match synthesizer.synthesize_to_file(text, voice, &path).await {
            Ok(format) => format,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        {
            let _guard = self.locks.lock(&dir).await;
            let row = metadata_row(&file_name, text);
            let csv = dir.join(METADATA_FILE);
            tokio::task::spawn_blocking(move || -> VoiceResult<()> {
                let mut file = OpenOptions::new().create(true).append(true).open(&csv)?;
                file.write_all(row.as_bytes())?;
                Ok(())
            })
            .await??;
        }

        info!("[SCRIBE] Archived {:?}", path);
        Ok(ArchivedClip {
            path,
            file_name,
            index: name.index,
            format,
        })
    }

    /// Claim the next index with create-new semantics. The placeholder is
    /// overwritten by the rendered audio.
    async fn reserve(&self, dir: &Path, identity: &GameIdentity) -> VoiceResult<ArchiveFileName> {
        let _guard = self.locks.lock(dir).await;
        let dir = dir.to_path_buf();
        let identity = identity.clone();

        tokio::task::spawn_blocking(move || -> VoiceResult<ArchiveFileName> {
            let mut index = highest_index(&dir) + 1;
            loop {
                let name = ArchiveFileName {
                    index,
                    npc_name: identity.npc_name.clone(),
                    game_name: identity.game_name,
                };
                let candidate = dir.join(name.render());
                match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                    Ok(_) => {
                        debug!("[SCRIBE] Reserved {:?}", candidate);
                        return Ok(name);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => index += 1,
                    Err(e) => return Err(e.into()),
                }
            }
        })
        .await?
    }
}

fn highest_index(dir: &Path) -> u32 {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| ArchiveFileName::parse(&e.file_name().to_string_lossy()))
        .map(|n| n.index)
        .max()
        .unwrap_or(0)
}

fn metadata_row(file_name: &str, text: &str) -> String {
    let clean: String = text
        .trim()
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            '|' => '/',
            other => other,
        })
        .collect();
    format!("{}|{}|{}\n", file_name, clean, clean)
}

/// Accept a caller-supplied wave path: `.wav` only, no `..`, and the file must
/// live under the archive root once symlinks are resolved. Relative paths are
/// taken from the archive root.
pub fn resolve_audio_path(archive_root: &Path, raw: &str) -> VoiceResult<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(VoiceApiError::InvalidArgument("filePath is required".to_string()));
    }
    let path = PathBuf::from(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(VoiceApiError::InvalidArgument(
            "path traversal detected".to_string(),
        ));
    }
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if !is_wav {
        return Err(VoiceApiError::InvalidArgument(format!(
            "'{}' is not a .wav file",
            raw
        )));
    }
    let candidate = if path.is_absolute() {
        path
    } else {
        archive_root.join(path)
    };

    let root = fs::canonicalize(archive_root).map_err(|e| {
        VoiceApiError::NotFound(format!("audio root {:?}: {}", archive_root, e))
    })?;
    let resolved = match fs::canonicalize(&candidate) {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VoiceApiError::NotFound(format!("audio file '{}'", raw)));
        }
        Err(e) => return Err(e.into()),
    };
    if !resolved.starts_with(&root) {
        warn!("[SCRIBE] Refused audio path outside the archive: {:?}", resolved);
        return Err(VoiceApiError::InvalidArgument(format!(
            "'{}' is outside the audio archive",
            raw
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_file_name_roundtrip() {
        let name = ArchiveFileName {
            index: 42,
            npc_name: "MamaMurphy".to_string(),
            game_name: GameName::Fallout4,
        };
        assert_eq!(name.render(), "00042_MamaMurphy_Fallout4.wav");
        assert_eq!(ArchiveFileName::parse("00042_MamaMurphy_Fallout4.wav"), Some(name));
    }

    #[test]
    fn test_archive_file_name_rejects_noise() {
        assert!(ArchiveFileName::parse("metadata.csv").is_none());
        assert!(ArchiveFileName::parse("00001_MamaMurphy_Fallout4.wav.synthnet_tmp").is_none());
        assert!(ArchiveFileName::parse("abc_MamaMurphy_Fallout4.wav").is_none());
        assert!(ArchiveFileName::parse("00001_Mama_Murphy_Fallout4.wav").is_none());
        assert!(ArchiveFileName::parse("00001_MamaMurphy_Skyrim.wav").is_none());
    }

    #[test]
    fn test_highest_index_ignores_gaps_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["00001_Piper_Fallout4.wav", "00007_Piper_Fallout4.wav", "metadata.csv"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(highest_index(dir.path()), 7);
    }

    #[test]
    fn test_metadata_row_sanitises_text() {
        assert_eq!(
            metadata_row("00001_Piper_Fallout4.wav", "a|b\nc"),
            "00001_Piper_Fallout4.wav|a/b c|a/b c\n"
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn test_resolve_audio_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let npc = root.join("Fallout4").join("Piper");
        fs::create_dir_all(&npc).unwrap();
        fs::write(npc.join("00001_Piper_Fallout4.wav"), b"").unwrap();

        let expected = fs::canonicalize(npc.join("00001_Piper_Fallout4.wav")).unwrap();
        assert_eq!(
            resolve_audio_path(root, "Fallout4/Piper/00001_Piper_Fallout4.wav").unwrap(),
            expected
        );
        let absolute = expected.to_string_lossy().into_owned();
        assert_eq!(resolve_audio_path(root, &absolute).unwrap(), expected);

        assert!(resolve_audio_path(root, "../secret.wav").is_err());
        assert!(resolve_audio_path(root, "notes.txt").is_err());
        assert!(resolve_audio_path(root, "").is_err());
        assert!(matches!(
            resolve_audio_path(root, "Fallout4/Piper/missing.wav"),
            Err(VoiceApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_audio_path_stays_inside_root() {
        let archive = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let stray = elsewhere.path().join("00001_Piper_Fallout4.wav");
        fs::write(&stray, b"").unwrap();

        let err = resolve_audio_path(archive.path(), &stray.to_string_lossy()).unwrap_err();
        assert!(matches!(err, VoiceApiError::InvalidArgument(_)));

        #[cfg(unix)]
        {
            let link = archive.path().join("00002_Piper_Fallout4.wav");
            std::os::unix::fs::symlink(&stray, &link).unwrap();
            let err = resolve_audio_path(archive.path(), "00002_Piper_Fallout4.wav").unwrap_err();
            assert!(matches!(err, VoiceApiError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_transcription_json_shape() {
        let id = GameIdentity::new("Fallout4", "Piper").unwrap();
        let t = Transcription::new("Hi", &id);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["text"], "Hi");
        assert_eq!(json["gameName"], "Fallout4");
        assert_eq!(json["npcName"], "Piper");

        let parsed: Transcription = serde_json::from_str(r#"{"text":"only text"}"#).unwrap();
        assert_eq!(parsed.text, "only text");
        assert!(parsed.audio_path().is_none());
    }
}
