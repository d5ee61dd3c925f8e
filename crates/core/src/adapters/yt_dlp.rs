//! Video fetcher backed by the yt-dlp command-line tool.

use std::ffi::OsStr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::process::run_tool;
use crate::collaborator::{CollaboratorError, FetchedMedia, MediaFetcher};
use crate::config::FetcherConfig;

/// Downloads videos with yt-dlp into a local directory.
pub struct YtDlpFetcher {
    config: FetcherConfig,
    download_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(config: FetcherConfig, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            download_dir: download_dir.into(),
        }
    }
}

/// The subset of yt-dlp's info JSON we use.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
    #[serde(default, rename = "_filename")]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
    #[serde(default)]
    filepath: Option<String>,
}

/// Parse the info JSON yt-dlp prints after downloading.
fn parse_info(stdout: &str) -> Result<FetchedMedia, CollaboratorError> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| CollaboratorError::Acquisition("yt-dlp printed no video info".to_string()))?;

    let info: VideoInfo = serde_json::from_str(line)
        .map_err(|e| CollaboratorError::Acquisition(format!("invalid yt-dlp output: {}", e)))?;

    let path = info
        .requested_downloads
        .iter()
        .find_map(|d| d.filepath.clone())
        .or(info.filename)
        .ok_or_else(|| CollaboratorError::Acquisition("yt-dlp did not report a file path".to_string()))?;

    let media_id = match info.extractor {
        Some(extractor) => format!("{}_{}", extractor.to_lowercase(), info.id),
        None => info.id,
    };

    Ok(FetchedMedia {
        media_id,
        path: PathBuf::from(path),
        title: info.title.unwrap_or_default(),
        description: info.description.unwrap_or_default(),
    })
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, CollaboratorError> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| CollaboratorError::Acquisition(format!("cannot create download dir: {}", e)))?;

        let template = self.download_dir.join("%(extractor)s_%(id)s.%(ext)s");
        let args: [&OsStr; 9] = [
            OsStr::new("--dump-json"),
            OsStr::new("--no-simulate"),
            OsStr::new("--no-warnings"),
            OsStr::new("--no-playlist"),
            OsStr::new("-f"),
            OsStr::new("mp4/best"),
            OsStr::new("-o"),
            template.as_os_str(),
            OsStr::new(url),
        ];
        let stdout = run_tool(&self.config.yt_dlp_path, args, self.config.timeout_secs)
            .await
            .map_err(CollaboratorError::Acquisition)?;

        let media = parse_info(&stdout)?;
        if !media.path.exists() {
            return Err(CollaboratorError::Acquisition(format!(
                "downloaded file missing: {}",
                media.path.display()
            )));
        }

        info!(media_id = %media.media_id, title = %media.title, "Video downloaded");
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let stdout = r#"{"id": "7321", "extractor": "TikTok", "title": "Best shakshuka", "description": "Eggs in sauce", "requested_downloads": [{"filepath": "/tmp/videos/tiktok_7321.mp4"}]}"#;
        let media = parse_info(stdout).unwrap();
        assert_eq!(media.media_id, "tiktok_7321");
        assert_eq!(media.path, PathBuf::from("/tmp/videos/tiktok_7321.mp4"));
        assert_eq!(media.title, "Best shakshuka");
        assert_eq!(media.description, "Eggs in sauce");
    }

    #[test]
    fn test_parse_info_falls_back_to_filename() {
        let stdout = "\n{\"id\": \"abc\", \"_filename\": \"/tmp/abc.mp4\"}\n";
        let media = parse_info(stdout).unwrap();
        assert_eq!(media.media_id, "abc");
        assert_eq!(media.path, PathBuf::from("/tmp/abc.mp4"));
        assert!(media.title.is_empty());
    }

    #[test]
    fn test_parse_info_without_path_fails() {
        let err = parse_info(r#"{"id": "abc"}"#).unwrap_err();
        assert!(matches!(err, CollaboratorError::Acquisition(_)));
    }
}
