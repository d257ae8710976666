// SynthNet Voice Library
// Copyright (c) 2026 Xing_The_Creator | SynthNet

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod server;
pub mod state;

pub use error::{ErrorKind, VoiceApiError, VoiceResult};
