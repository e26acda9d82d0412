//! On-disk capture directory.
//!
//! Scripts land as `{host}_{unix_ms}_{basename}` where every non-alphanumeric
//! character of the host becomes `_`. A name already taken gets a `-1`, `-2`...
//! suffix before the extension. The directory is created on demand and never
//! cleared.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_(\d{10,})_(.+)$").expect("static regex"));

const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".jsx"];
const MAX_NAME_SUFFIX: u32 = 1_000;

/// A script previously written to the capture directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredScript {
    pub file_name: String,
    pub path: PathBuf,
    pub hostname: String,
    pub timestamp: Option<i64>,
    pub size: u64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn file_name_for(url: &str, timestamp: i64) -> String {
        let parsed = Url::parse(url).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown");
        let host: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        let segment = parsed
            .as_ref()
            .and_then(|u| u.path_segments())
            .and_then(|mut segs| segs.next_back())
            .unwrap_or_default();
        let mut basename: String = segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if basename.is_empty() {
            basename = "index.js".to_string();
        } else if !SCRIPT_EXTENSIONS
            .iter()
            .any(|ext| basename.to_lowercase().ends_with(ext))
        {
            basename.push_str(".js");
        }

        format!("{}_{}_{}", host, timestamp, basename)
    }

    pub async fn persist_script(&self, url: &str, content: &str, timestamp: i64) -> io::Result<PathBuf> {
        self.ensure_dir().await?;
        let name = Self::file_name_for(url, timestamp);

        for n in 0..=MAX_NAME_SUFFIX {
            let path = self.root.join(numbered(&name, n));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            debug!("Saved script {} -> {}", url, path.display());
            return Ok(path);
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {} in {}", name, self.root.display()),
        ))
    }

    pub async fn save_screenshot(&self, png: &[u8], timestamp: i64) -> io::Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.root.join(format!("debug_{}.png", timestamp));
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }

    /// Every stored script, oldest first. A missing directory reads as empty.
    pub async fn read_all(&self) -> io::Result<Vec<StoredScript>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut scripts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let lower = file_name.to_lowercase();
            if !SCRIPT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable capture {}: {}", path.display(), e);
                    continue;
                }
            };
            let size = bytes.len() as u64;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let (hostname, timestamp) = parse_file_name(&file_name)
                .map(|(h, t)| (h, Some(t)))
                .unwrap_or_else(|| ("unknown".to_string(), None));

            scripts.push(StoredScript {
                size,
                file_name,
                path,
                hostname,
                timestamp,
                content,
            });
        }

        scripts.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(scripts)
    }
}

/// `name` with `-n` inserted before the extension; `n == 0` leaves it alone.
fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, n, ext),
        None => format!("{}-{}", name, n),
    }
}

/// Recover `(hostname, timestamp)` from a stored file name.
pub fn parse_file_name(file_name: &str) -> Option<(String, i64)> {
    let caps = FILE_NAME_RE.captures(file_name)?;
    let timestamp = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), timestamp))
}
