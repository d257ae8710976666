// SynthNet I/O Shield: Shadow Write & Atomic Move
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Every file the service produces (wave files, HTML logs, CSV metadata) is
// first written to a `.synthnet_tmp` sidecar and then renamed into place, so
// readers never observe a half-written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct AtomicMover;

impl AtomicMover {
    /// Move a completed temp file to its final destination.
    ///
    /// * Same drive → `fs::rename` (atomic, zero-copy).
    /// * Cross-drive → `fs::copy` + `fs::remove_file` (fallback).
    pub fn commit(temp_path: &Path, final_path: &Path) -> std::io::Result<()> {
        if !temp_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source temp file missing: {:?}", temp_path),
            ));
        }

        match fs::rename(temp_path, final_path) {
            Ok(()) => {
                debug!("[IO_SHIELD] rename {:?} -> {:?}", temp_path, final_path);
                Ok(())
            }
            Err(rename_err) => {
                warn!(
                    "[IO_SHIELD] Rename failed ({}). Falling back to copy-delete.",
                    rename_err
                );
                fs::copy(temp_path, final_path)?;
                fs::remove_file(temp_path)?;
                Ok(())
            }
        }
    }

    /// `conversation.html` → `conversation.html.synthnet_tmp`
    pub fn tmp_path_for(final_path: &Path) -> PathBuf {
        let mut tmp = final_path.as_os_str().to_owned();
        tmp.push(".synthnet_tmp");
        PathBuf::from(tmp)
    }

    /// Write `contents` to a sidecar, fsync it, then move it over `final_path`.
    pub fn write(final_path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let tmp = Self::tmp_path_for(final_path);
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            Self::commit(&tmp, final_path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}
