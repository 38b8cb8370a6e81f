//! Session transcript logger
//!
//! Append-only JSONL under `<data_dir>/sessions/<id>.jsonl`, one record per
//! line, mode 0600. Tool arguments are redacted by the caller before they
//! get here; this module never sees raw secrets on the happy path but keeps
//! the file permissions tight regardless.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use super::output::UiBlock;

/// One transcript record. Unset fields are omitted from the JSON line.
#[derive(Debug, Default, Serialize)]
pub struct SessionRecord {
    pub ts: String,
    #[serde(rename = "type")]
    pub record_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Redacted JSON text of the tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blocks: Vec<UiBlock>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub is_error: bool,
}

impl SessionRecord {
    pub fn now(record_type: &str) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            record_type: record_type.to_string(),
            ..Default::default()
        }
    }
}

/// Appends records to one session's transcript file.
pub struct SessionLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl SessionLogger {
    /// Open (or create) `<data_dir>/sessions/<session_id>.jsonl`. The
    /// sessions directory is 0700 and the file 0600.
    pub fn open(data_dir: &Path, session_id: &str) -> Result<Self> {
        let dir = data_dir.join("sessions");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create sessions directory: {}", dir.display()))?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .context("failed to set sessions directory permissions")?;

        let path = dir.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open session log: {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("failed to set session log permissions")?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line. Logging failures are
    /// swallowed; a transcript must never take down a turn.
    pub fn log(&self, record: &SessionRecord) {
        let mut guard = self.file.lock().unwrap();
        let Some(file) = guard.as_mut() else {
            return;
        };
        let Ok(mut line) = serde_json::to_vec(record) else {
            return;
        };
        line.push(b'\n');
        let _ = file.write_all(&line);
    }

    pub fn close(&self) {
        let mut guard = self.file.lock().unwrap();
        *guard = None;
    }
}
