// SynthNet Agent Modules
// Copyright (c) 2026 Xing_The_Creator | SynthNet

pub mod conversation;
pub mod core;
pub mod health;
pub mod instructions;
pub mod io_shield;
pub mod npc;
pub mod openai;
pub mod scribe;
pub mod voice;
