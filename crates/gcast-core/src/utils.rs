use std::{
    fmt::Display,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Utc;

use crate::{errors::Error, messaging::types::MediaKind, Result};

// ============== Error Log ==============

/// Append-only flat file holding full failure detail for the operator.
///
/// Admins only ever see a localized message; the details land here and in tracing.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, context: &str, detail: &dyn Display) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::External("error log lock poisoned".to_string()))?;

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));
        out.push_str(&format!("\ntimestamp: {}", Utc::now().to_rfc3339()));
        out.push_str(&format!("\ncontext: {context}"));
        out.push_str(&format!("\nerror: {detail}\n"));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Like [`ErrorLog::write`], but a failure to write is only traced.
    pub fn record(&self, context: &str, detail: &dyn Display) {
        if let Err(e) = self.write(context, detail) {
            tracing::warn!(path = %self.path.display(), "failed to append to error log: {e}");
        }
    }
}

// ============== File Names ==============

/// Keep only characters that are safe in a single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extension of the original upload, or a sensible default for its kind.
pub fn media_extension(file_name: Option<&str>, kind: MediaKind) -> String {
    file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| sanitize_filename(e).to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e != "upload")
        .unwrap_or_else(|| kind.default_extension().to_string())
}

/// Best-effort unlink. A file that is already gone is fine.
pub async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), "could not remove file: {e}");
        }
    }
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
pub(crate) fn tmp_file(prefix: &str, ext: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.{ext}"))
}
