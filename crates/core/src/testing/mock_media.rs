//! Mock media collaborators: fetcher, transcriber, visual text and images.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};

use crate::collaborator::{
    CollaboratorError, FetchedMedia, ImageCandidates, ImageExtractor, MediaFetcher, Transcriber,
    VisualTextExtractor,
};

/// Mock implementation of the MediaFetcher trait.
///
/// Without a configured result, each URL yields media whose id is derived
/// from the call count so separate jobs never share cache entries.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    /// URLs fetched, in order.
    urls: Arc<RwLock<Vec<String>>>,
    /// Result returned for every fetch, if set.
    media: Arc<RwLock<Option<FetchedMedia>>>,
    /// If set, the next fetch will fail with this error.
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
    /// Simulated fetch duration.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            urls: Arc::new(RwLock::new(Vec::new())),
            media: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Return this media for every fetch.
    pub async fn set_media(&self, media: FetchedMedia) {
        *self.media.write().await = Some(media);
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// URLs fetched so far.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.urls.read().await.clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, CollaboratorError> {
        let call = {
            let mut urls = self.urls.write().await;
            urls.push(url.to_string());
            urls.len()
        };

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        if let Some(media) = self.media.read().await.as_ref() {
            return Ok(media.clone());
        }
        Ok(super::fixtures::fetched_media(&format!("mock_{}", call)))
    }
}

/// Mock implementation of the Transcriber trait.
///
/// Can be held so a job parks inside the transcription stage:
///
/// ```rust,ignore
/// transcriber.hold();
/// scheduler.submit_and_start(url, pipeline).await?;
/// transcriber.wait_started().await;
/// // job is now "transcribing"
/// transcriber.release();
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    transcript: Arc<RwLock<String>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
    /// Paths transcribed, in order.
    calls: Arc<RwLock<Vec<PathBuf>>>,
    /// Language hint of each call.
    languages: Arc<RwLock<Vec<String>>>,
    /// While `true`, transcription blocks.
    held: Arc<watch::Sender<bool>>,
    started: Arc<Notify>,
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscriber {
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            transcript: Arc::new(RwLock::new(
                "Today we make shakshuka. Fry onions, add tomatoes, crack the eggs.".to_string(),
            )),
            next_error: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
            languages: Arc::new(RwLock::new(Vec::new())),
            held: Arc::new(held),
            started: Arc::new(Notify::new()),
        }
    }

    pub async fn set_transcript(&self, transcript: impl Into<String>) {
        *self.transcript.write().await = transcript.into();
    }

    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Block transcriptions until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    /// Unblock held transcriptions.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Wait until a transcription has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn languages(&self) -> Vec<String> {
        self.languages.read().await.clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, path: &Path, language: &str) -> Result<String, CollaboratorError> {
        self.calls.write().await.push(path.to_path_buf());
        self.languages.write().await.push(language.to_string());
        self.started.notify_one();

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.transcript.read().await.clone())
    }
}

/// Mock implementation of the VisualTextExtractor trait.
#[derive(Debug, Clone)]
pub struct MockVisualText {
    text: Arc<RwLock<String>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl Default for MockVisualText {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVisualText {
    pub fn new() -> Self {
        Self {
            text: Arc::new(RwLock::new(String::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_text(&self, text: impl Into<String>) {
        *self.text.write().await = text.into();
    }

    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl VisualTextExtractor for MockVisualText {
    async fn extract_text(&self, _path: &Path, _language: &str) -> Result<String, CollaboratorError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.text.read().await.clone())
    }
}

/// Mock implementation of the ImageExtractor trait.
#[derive(Debug, Clone)]
pub struct MockImageExtractor {
    candidates: Arc<RwLock<ImageCandidates>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl Default for MockImageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageExtractor {
    /// Starts with no candidates.
    pub fn new() -> Self {
        Self {
            candidates: Arc::new(RwLock::new(ImageCandidates::empty())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_candidates(&self, candidates: ImageCandidates) {
        *self.candidates.write().await = candidates;
    }

    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl ImageExtractor for MockImageExtractor {
    async fn extract_candidates(&self, _path: &Path) -> Result<ImageCandidates, CollaboratorError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.candidates.read().await.clone())
    }
}
