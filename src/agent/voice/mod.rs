// SynthNet Voice Subsystem
// Copyright (c) 2026 Xing_The_Creator | SynthNet

pub mod audio_io;
pub mod directory;
pub mod recognizer;
pub mod tts;
pub mod wav;

pub use audio_io::AudioPlayer;
pub use directory::{VoiceDescriptor, VoiceDirectory};
pub use recognizer::{RecognitionAdapter, RecognizerInfo, SpeechRecognizer, WhisperRecognizer};
pub use tts::{CommandSynthesizer, SpeechSynthesizer, SynthesisAdapter};
