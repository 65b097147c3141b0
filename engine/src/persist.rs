//! Small-file JSON persistence with crash-safe replace semantics.
//!
//! Every artifact and state file in the pipeline is written the same way:
//! serialize to a sibling temp file, fsync, then rename over the target.
//! Readers therefore only ever observe the previous complete file or the
//! new complete file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::errors::EngineError;

/// Sibling temp path used during atomic replace, `"{name}.tmp"`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Writes `value` as pretty-printed JSON to `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = tmp_path(path);
    let written = (|| -> Result<(), EngineError> {
        let file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&file, value)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads JSON from `path`. A missing or unreadable file yields `None` so
/// callers can fall back to a fresh default instead of refusing to start.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "state file is unreadable, starting from defaults"
            );
            None
        }
    }
}
