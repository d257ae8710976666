// SynthNet Kernel State
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use std::sync::Arc;

use crate::agent::core::{VoiceCore, VoiceServices};
use crate::agent::health::HealthMonitor;
use crate::config::Settings;
use crate::error::VoiceResult;

pub type AppState = Arc<KernelState>;

const HEALTH_INTERVAL_SECS: u64 = 30;

/// Everything a request handler can reach. Built once, never mutated.
pub struct KernelState {
    pub core: Arc<VoiceCore>,
    pub health: HealthMonitor,
    pub api_key: Option<String>,
}

impl KernelState {
    pub fn new(settings: &Settings, services: VoiceServices) -> Self {
        Self {
            core: Arc::new(VoiceCore::new(services)),
            health: HealthMonitor::new(
                HEALTH_INTERVAL_SECS,
                vec![settings.log_dir.clone(), settings.audio_dir.clone()],
            ),
            api_key: settings.api_key.clone(),
        }
    }

    pub fn from_settings(settings: &Settings) -> VoiceResult<Self> {
        Ok(Self::new(settings, VoiceServices::from_settings(settings)?))
    }
}
