//! Helpers for tests that drive real stand-in processes.

use crate::model::PipelineConfig;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempfile::TempDir;

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialise tests that write and exec scripts; a script still open for
/// writing in a concurrently forked child fails to exec with ETXTBSY.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stand-in probe and encoder scripts living in a temporary directory.
pub(crate) struct Scripts {
    dir: TempDir,
}

impl Scripts {
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write an executable `/bin/sh` script and return its path.
    pub(crate) fn write(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Pipeline config using `encoder` with short, test friendly timeouts.
    pub(crate) fn config(&self, encoder: impl AsRef<Path>) -> PipelineConfig {
        PipelineConfig {
            encoder_bin: encoder.as_ref().to_path_buf(),
            settle_timeout: Duration::from_secs(5),
            kill_after: Some(Duration::from_secs(5)),
        }
    }
}
