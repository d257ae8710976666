// SynthNet Health Check & Watchdog
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Periodically checks that the data directories accept writes and that the
// host is not out of memory. The last verdict is served by GET /health.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use sysinfo::SystemExt;
use tracing::{error, info, warn};

const MEMORY_ALERT_PCT: f64 = 95.0;

/// Health status of a subsystem
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum SubsystemStatus {
    Healthy,
    Degraded(String),
    Down(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub uptime_secs: u64,
    pub heartbeats: u64,
    pub monitoring: bool,
    pub memory: SubsystemStatus,
    pub storage: SubsystemStatus,
}

pub struct HealthMonitor {
    start_time: Instant,
    is_running: Arc<AtomicBool>,
    heartbeat_count: Arc<AtomicU64>,
    check_interval: Duration,
    watched_dirs: Arc<Vec<PathBuf>>,
    last: Arc<RwLock<(SubsystemStatus, SubsystemStatus)>>,
}

impl HealthMonitor {
    /// Create a monitor for `watched_dirs` with the given check interval.
    pub fn new(check_interval_secs: u64, watched_dirs: Vec<PathBuf>) -> Self {
        Self {
            start_time: Instant::now(),
            is_running: Arc::new(AtomicBool::new(false)),
            heartbeat_count: Arc::new(AtomicU64::new(0)),
            check_interval: Duration::from_secs(check_interval_secs.max(1)),
            watched_dirs: Arc::new(watched_dirs),
            last: Arc::new(RwLock::new((SubsystemStatus::Healthy, SubsystemStatus::Healthy))),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeat_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Run one round of checks now and remember the result.
    pub fn check_now(&self) -> (SubsystemStatus, SubsystemStatus) {
        let verdict = (check_memory_health(), check_storage_health(&self.watched_dirs));
        if let Ok(mut last) = self.last.write() {
            *last = verdict.clone();
        }
        verdict
    }

    /// Start the background loop. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let is_running = self.is_running.clone();
        let heartbeat_count = self.heartbeat_count.clone();
        let watched = self.watched_dirs.clone();
        let last = self.last.clone();
        let interval = self.check_interval;

        if is_running.swap(true, Ordering::Relaxed) {
            return;
        }

        tokio::spawn(async move {
            info!("[HEALTH] Watchdog started (interval: {:?})", interval);

            while is_running.load(Ordering::Relaxed) {
                tokio::time::sleep(interval).await;
                let count = heartbeat_count.fetch_add(1, Ordering::Relaxed) + 1;

                let dirs = watched.clone();
                let verdict = match tokio::task::spawn_blocking(move || {
                    (check_memory_health(), check_storage_health(&dirs))
                })
                .await
                {
                    Ok(v) => v,
                    Err(e) => {
                        error!("[HEALTH] Check panicked: {}", e);
                        continue;
                    }
                };

                if verdict.0 != SubsystemStatus::Healthy {
                    warn!("[HEALTH] ⚠️ Memory: {:?} (heartbeat #{})", verdict.0, count);
                }
                if verdict.1 != SubsystemStatus::Healthy {
                    warn!("[HEALTH] ⚠️ Storage: {:?} (heartbeat #{})", verdict.1, count);
                }
                if count % 60 == 0 {
                    info!("[HEALTH] ♥ System alive | Heartbeat #{}", count);
                }

                if let Ok(mut slot) = last.write() {
                    *slot = verdict;
                }
            }

            info!("[HEALTH] Watchdog stopped.");
        });
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Relaxed);
        info!("[HEALTH] Shutdown requested.");
    }

    pub fn report(&self) -> HealthReport {
        let (memory, storage) = self
            .last
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone());
        HealthReport {
            uptime_secs: self.uptime_secs(),
            heartbeats: self.heartbeat_count(),
            monitoring: self.is_running(),
            memory,
            storage,
        }
    }
}

fn check_memory_health() -> SubsystemStatus {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return SubsystemStatus::Healthy;
    }
    let usage_pct = (sys.used_memory() as f64 / total as f64) * 100.0;
    if usage_pct < MEMORY_ALERT_PCT {
        SubsystemStatus::Healthy
    } else {
        SubsystemStatus::Degraded(format!("{:.0}% memory in use", usage_pct))
    }
}

fn check_storage_health(dirs: &[PathBuf]) -> SubsystemStatus {
    for dir in dirs {
        if let Err(e) = check_writable(dir) {
            error!("[HEALTH] Disk write check failed for {:?}: {}", dir, e);
            return SubsystemStatus::Down(format!("{} is not writable: {}", dir.display(), e));
        }
    }
    SubsystemStatus::Healthy
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(".synthnet_health_check");
    std::fs::write(&marker, b"ok")?;
    std::fs::remove_file(&marker)
}
