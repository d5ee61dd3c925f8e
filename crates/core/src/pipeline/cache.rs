//! File cache for transcripts and on-screen text.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Kind of cached text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Transcription,
    Visual,
}

impl TextKind {
    fn as_str(&self) -> &'static str {
        match self {
            TextKind::Transcription => "transcription",
            TextKind::Visual => "visual",
        }
    }
}

/// Caches text under `<root>/<media_id>/<kind>_<language>.txt`.
///
/// Cache failures never fail a job; they are logged and treated as misses.
#[derive(Debug, Clone)]
pub struct TextCache {
    root: PathBuf,
}

impl TextCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, media_id: &str, kind: TextKind, language: &str) -> PathBuf {
        self.root
            .join(sanitize(media_id))
            .join(format!("{}_{}.txt", kind.as_str(), sanitize(language)))
    }

    pub async fn load(&self, media_id: &str, kind: TextKind, language: &str) -> Option<String> {
        let path = self.path(media_id, kind, language);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache file");
                None
            }
        }
    }

    pub async fn store(&self, media_id: &str, kind: TextKind, language: &str, text: &str) {
        let path = self.path(media_id, kind, language);
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(path = %dir.display(), error = %e, "Failed to create cache directory");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, text).await {
            warn!(path = %path.display(), error = %e, "Failed to write cache file");
        }
    }
}

/// Keep ids from escaping the cache root.
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = TextCache::new(dir.path());

        assert!(cache.load("abc123", TextKind::Transcription, "he").await.is_none());
        cache.store("abc123", TextKind::Transcription, "he", "hello").await;

        assert_eq!(
            cache.load("abc123", TextKind::Transcription, "he").await.as_deref(),
            Some("hello")
        );
        assert!(cache.load("abc123", TextKind::Visual, "he").await.is_none());
        assert!(dir.path().join("abc123").join("transcription_he.txt").exists());
    }

    #[test]
    fn test_media_id_cannot_escape_root() {
        let cache = TextCache::new("/cache");
        let path = cache.path("../../etc", TextKind::Visual, "en");
        assert!(path.starts_with("/cache"));
        assert_eq!(path, PathBuf::from("/cache/______etc/visual_en.txt"));
    }
}
