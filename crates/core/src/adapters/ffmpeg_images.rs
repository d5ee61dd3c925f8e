//! Dish image candidates sampled from the video with ffmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::process::run_tool;
use crate::collaborator::{CollaboratorError, ImageCandidates, ImageExtractor, ImageSelector};
use crate::config::ImagesConfig;

/// Per-invocation limit for ffprobe and single-frame ffmpeg runs.
const FRAME_TIMEOUT_SECS: u64 = 60;

/// Where the densely sampled tail of the clip starts.
const LATE_SECTION_START: f64 = 0.66;

/// Kept clear of the last instant, which is often a black or fading frame.
const END_MARGIN_SECS: f64 = 0.5;

const SHARPEN_FILTER: &str = "unsharp=5:5:0.5:5:5:0.5";

/// Samples frames weighted toward the end of the clip, lets an optional
/// [`ImageSelector`] pick the dish photo, then sharpens it.
pub struct FfmpegImageExtractor {
    config: ImagesConfig,
    selector: Option<Arc<dyn ImageSelector>>,
}

impl FfmpegImageExtractor {
    pub fn new(config: ImagesConfig) -> Self {
        Self {
            config,
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ImageSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    async fn probe_duration(&self, video: &Path) -> Result<f64, CollaboratorError> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            video.into(),
        ];
        let stdout = run_tool(&self.config.ffprobe_path, args, FRAME_TIMEOUT_SECS)
            .await
            .map_err(CollaboratorError::ImageExtraction)?;

        stdout
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| CollaboratorError::ImageExtraction(format!("unusable duration: {:?}", stdout.trim())))
    }

    async fn grab_frame(&self, video: &Path, at_secs: f64, output: &Path) -> Result<(), String> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.2}", at_secs).into(),
            "-i".into(),
            video.into(),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            output.into(),
        ];
        run_tool(&self.config.ffmpeg_path, args, FRAME_TIMEOUT_SECS).await?;
        Ok(())
    }

    /// Index of the dish photo. Falls back to the last frame when there is
    /// no selector or it gives no usable answer.
    async fn choose_best(&self, frames: &[PathBuf]) -> usize {
        let fallback = frames.len().saturating_sub(1);
        let Some(selector) = &self.selector else {
            return fallback;
        };

        match selector.select(frames).await {
            Ok(Some(index)) if index < frames.len() => {
                debug!(selector = selector.name(), index, "Dish frame selected");
                index
            }
            Ok(_) => {
                debug!(selector = selector.name(), "No usable frame choice, using last frame");
                fallback
            }
            Err(e) => {
                warn!(selector = selector.name(), error = %e, "Frame selection failed, using last frame");
                fallback
            }
        }
    }

    /// Sharpened copy of `frame` at `output`. If ffmpeg fails the frame is
    /// copied as is; if that fails too the original frame is kept.
    async fn enhance(&self, frame: &Path, output: &Path) -> PathBuf {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            frame.into(),
            "-vf".into(),
            SHARPEN_FILTER.into(),
            "-q:v".into(),
            "1".into(),
            output.into(),
        ];
        match run_tool(&self.config.ffmpeg_path, args, FRAME_TIMEOUT_SECS).await {
            Ok(_) if output.exists() => return output.to_path_buf(),
            Ok(_) => debug!("ffmpeg produced no enhanced frame"),
            Err(e) => debug!(error = %e, "Frame enhancement failed, copying frame"),
        }

        match tokio::fs::copy(frame, output).await {
            Ok(_) => output.to_path_buf(),
            Err(e) => {
                warn!(error = %e, "Could not write dish image, keeping sampled frame");
                frame.to_path_buf()
            }
        }
    }
}

/// Timestamps of `count` frames: a third of them spread over the first 66% of
/// the clip, the rest over the remainder, where the finished dish is usually
/// shown. The tail is skipped when the clip is too short for it.
pub fn frame_times(duration: f64, count: usize) -> Vec<f64> {
    let early = count / 3;
    let late = count - early;
    let late_start = duration * LATE_SECTION_START;

    let mut times = Vec::with_capacity(count);
    if early > 0 {
        let interval = late_start / (early + 1) as f64;
        times.extend((1..=early).map(|i| interval * i as f64));
    }

    let late_span = duration - late_start - END_MARGIN_SECS;
    if late > 0 && late_span > 0.0 {
        let interval = late_span / (late + 1) as f64;
        times.extend((1..=late).map(|i| late_start + interval * i as f64));
    }
    times
}

fn sibling_path(video: &Path, suffix: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}{}", stem, suffix))
}

fn frames_dir(video: &Path) -> PathBuf {
    sibling_path(video, "_frames")
}

fn dish_path(video: &Path) -> PathBuf {
    sibling_path(video, "_dish.jpg")
}

#[async_trait]
impl ImageExtractor for FfmpegImageExtractor {
    async fn extract_candidates(&self, path: &Path) -> Result<ImageCandidates, CollaboratorError> {
        let duration = self.probe_duration(path).await?;
        let dir = frames_dir(path);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CollaboratorError::ImageExtraction(format!("cannot create frames dir: {}", e)))?;

        let mut paths = Vec::new();
        for (i, at) in frame_times(duration, self.config.candidate_count).into_iter().enumerate() {
            let output = dir.join(format!("dish_candidate_{:02}.jpg", i));
            match self.grab_frame(path, at, &output).await {
                Ok(()) if output.exists() => paths.push(output),
                Ok(()) => debug!(at, "ffmpeg produced no frame"),
                Err(e) => debug!(at, error = %e, "Skipping frame"),
            }
        }

        if paths.is_empty() {
            return Err(CollaboratorError::ImageExtraction(
                "no frames could be extracted".to_string(),
            ));
        }

        let best_index = self.choose_best(&paths).await;
        if self.config.enhance {
            let dish = self.enhance(&paths[best_index], &dish_path(path)).await;
            paths[best_index] = dish;
        }

        info!(
            frames = paths.len(),
            best_index,
            image = %paths[best_index].display(),
            "Dish image candidates ready"
        );
        Ok(ImageCandidates { paths, best_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Selector returning a scripted answer and recording what it was shown.
    struct ScriptedSelector {
        answer: Result<Option<usize>, CollaboratorError>,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedSelector {
        fn new(answer: Result<Option<usize>, CollaboratorError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ImageSelector for ScriptedSelector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn select(&self, frames: &[PathBuf]) -> Result<Option<usize>, CollaboratorError> {
            *self.seen.lock().await = frames.to_vec();
            self.answer.clone()
        }
    }

    fn frames(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| PathBuf::from(format!("/tmp/v_frames/dish_candidate_{:02}.jpg", i)))
            .collect()
    }

    #[test]
    fn test_frame_times_weighted_to_end() {
        let times = frame_times(30.0, 12);
        assert_eq!(times.len(), 12);

        let late_start = 30.0 * LATE_SECTION_START;
        assert_eq!(times.iter().filter(|t| **t < late_start).count(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(*times.last().unwrap() < 30.0 - END_MARGIN_SECS);
        // First early frame: 19.8s split into 5 gaps
        assert!((times[0] - 3.96).abs() < 1e-9);
    }

    #[test]
    fn test_frame_times_short_clip_skips_tail() {
        // 0.6s clip: the tail is shorter than the end margin
        let times = frame_times(0.6, 6);
        assert_eq!(times.len(), 2);
        assert!(times.iter().all(|t| *t < 0.6 * LATE_SECTION_START));
    }

    #[test]
    fn test_frame_times_single_frame_is_late() {
        let times = frame_times(10.0, 1);
        assert_eq!(times.len(), 1);
        assert!(times[0] > 6.6);
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            frames_dir(Path::new("/data/tiktok_1.mp4")),
            PathBuf::from("/data/tiktok_1_frames")
        );
        assert_eq!(
            dish_path(Path::new("/data/tiktok_1.mp4")),
            PathBuf::from("/data/tiktok_1_dish.jpg")
        );
    }

    #[tokio::test]
    async fn test_choose_best_without_selector_is_last_frame() {
        let extractor = FfmpegImageExtractor::new(ImagesConfig::default());
        assert_eq!(extractor.choose_best(&frames(5)).await, 4);
    }

    #[tokio::test]
    async fn test_choose_best_uses_selector() {
        let selector = ScriptedSelector::new(Ok(Some(2)));
        let extractor = FfmpegImageExtractor::new(ImagesConfig::default())
            .with_selector(selector.clone());

        assert_eq!(extractor.choose_best(&frames(5)).await, 2);
        assert_eq!(selector.seen.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn test_choose_best_falls_back_on_bad_answers() {
        for answer in [
            Ok(None),
            Ok(Some(9)),
            Err(CollaboratorError::ImageExtraction("API error: 429".to_string())),
        ] {
            let extractor = FfmpegImageExtractor::new(ImagesConfig::default())
                .with_selector(ScriptedSelector::new(answer));
            assert_eq!(extractor.choose_best(&frames(5)).await, 4);
        }
    }

    #[tokio::test]
    async fn test_enhance_copies_when_ffmpeg_missing() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("dish_candidate_03.jpg");
        tokio::fs::write(&frame, b"jpeg").await.unwrap();
        let output = dir.path().join("clip_dish.jpg");

        let config = ImagesConfig {
            ffmpeg_path: dir.path().join("no-such-ffmpeg"),
            ..ImagesConfig::default()
        };
        let extractor = FfmpegImageExtractor::new(config);

        assert_eq!(extractor.enhance(&frame, &output).await, output);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_enhance_keeps_frame_when_copy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("missing.jpg");
        let config = ImagesConfig {
            ffmpeg_path: dir.path().join("no-such-ffmpeg"),
            ..ImagesConfig::default()
        };
        let extractor = FfmpegImageExtractor::new(config);

        let kept = extractor.enhance(&frame, &dir.path().join("clip_dish.jpg")).await;
        assert_eq!(kept, frame);
    }
}
