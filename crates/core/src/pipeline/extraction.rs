//! The video-to-recipe pipeline body.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{PipelineConfig, PipelineError, TextCache, TextKind};
use crate::collaborator::{
    ExportTarget, FetchedMedia, ImageCandidates, ImageExtractor, MediaFetcher, RecipeExporter,
    RecipeGenerator, RecipePayload, Transcriber, VisualTextExtractor,
};
use crate::confirmation::{ConfirmationGate, ConfirmationOutcome};
use crate::job::{Job, ProgressUpdate, Stage};
use crate::metrics;
use crate::progress::{JobCompletion, ProgressPublisher};
use crate::scheduler::{JobHandle, PipelineBody, CANCELLED_BY_USER};
use crate::settings::{RuntimeSettings, SettingsService};

/// The external services a pipeline run calls.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    /// Optional; without it the visual stage records no on-screen text.
    pub visual_text: Option<Arc<dyn VisualTextExtractor>>,
    pub images: Arc<dyn ImageExtractor>,
    pub generator: Arc<dyn RecipeGenerator>,
    /// One exporter per upload target, called in order.
    pub exporters: Vec<Arc<dyn RecipeExporter>>,
}

/// Turns a video URL into an uploaded recipe.
///
/// Every run ends in exactly one terminal publisher call, unless the job was
/// already finished elsewhere (cancelled, or failed by another process).
pub struct ExtractionPipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    publisher: Arc<ProgressPublisher>,
    gate: Arc<ConfirmationGate>,
    settings: Option<Arc<SettingsService>>,
    cache: TextCache,
}

/// What a run has produced so far, kept for the history entry on failure.
#[derive(Default)]
struct RunState {
    recipe: Option<RecipePayload>,
}

impl ExtractionPipeline {
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        publisher: Arc<ProgressPublisher>,
        gate: Arc<ConfirmationGate>,
    ) -> Self {
        let cache = TextCache::new(config.work_dir.clone());
        Self {
            config,
            collaborators,
            publisher,
            gate,
            settings: None,
            cache,
        }
    }

    /// Read runtime overrides from `settings` at the start of each run.
    pub fn with_settings(mut self, settings: Arc<SettingsService>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Upload targets in the order they are tried, before runtime overrides.
    pub fn targets(&self) -> Vec<ExportTarget> {
        self.collaborators.exporters.iter().map(|e| e.target()).collect()
    }

    /// Settings snapshot for one run.
    fn run_settings(&self) -> RuntimeSettings {
        match &self.settings {
            Some(settings) => settings.current(),
            None => RuntimeSettings {
                confirm_before_upload: self.gate.is_enabled(),
                language: self.config.language.clone(),
                output_targets: self.targets(),
            },
        }
    }

    /// Exporters for `targets`, in that order.
    fn exporters_for(&self, targets: &[ExportTarget]) -> Vec<Arc<dyn RecipeExporter>> {
        targets
            .iter()
            .filter_map(|target| {
                self.collaborators
                    .exporters
                    .iter()
                    .find(|e| e.target() == *target)
                    .cloned()
            })
            .collect()
    }

    async fn execute(
        &self,
        job: &Job,
        handle: &JobHandle,
        state: &mut RunState,
    ) -> Result<JobCompletion, PipelineError> {
        let settings = self.run_settings();
        let exporters = self.exporters_for(&settings.output_targets);
        let targets: Vec<ExportTarget> = exporters.iter().map(|e| e.target()).collect();

        let media = self.acquire(job, handle).await?;
        let transcript = self.transcribe(handle, &media, &settings.language).await?;
        let visual = self.read_screen(handle, &media, &settings.language).await?;
        let candidates = self.pick_images(handle, &media).await?;

        let combined = combine_transcript(&transcript, visual.as_deref());
        let recipe = self.generate(job, handle, &media, &combined).await?;
        state.recipe = Some(recipe.clone());

        let image = if settings.confirm_before_upload {
            self.await_confirmation(job, handle, &recipe, &candidates, targets.clone()).await?
        } else {
            candidates.best().cloned()
        };
        handle.checkpoint()?;

        let names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        self.report(
            handle,
            ProgressUpdate::new(Stage::Upload, format!("Uploading to {}...", names.join(", ")), 95),
        )?;
        let started = Instant::now();
        let (uploaded_to, failed_targets) = self.export(job, &exporters, &recipe, image.as_deref()).await?;
        observe_stage(Stage::Upload, started);

        Ok(JobCompletion {
            recipe,
            thumbnail: image.map(|p| p.to_string_lossy().into_owned()),
            uploaded_to,
            failed_targets,
        })
    }

    async fn acquire(&self, job: &Job, handle: &JobHandle) -> Result<FetchedMedia, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Info, "Fetching video information...", 10))?;
        let started = Instant::now();

        let media = self
            .collaborators
            .fetcher
            .fetch(&job.url)
            .await
            .map_err(|e| PipelineError::Acquisition(e.detail().to_string()))?;
        observe_stage(Stage::Download, started);

        self.report(
            handle,
            ProgressUpdate::new(Stage::Info, format!("Video: {}", media.title), 15)
                .with_video_title(media.title.clone()),
        )?;
        self.report(handle, ProgressUpdate::new(Stage::Download, "Downloading video...", 20))?;
        self.report(handle, ProgressUpdate::new(Stage::Download, "Video downloaded successfully", 30))?;
        Ok(media)
    }

    async fn transcribe(
        &self,
        handle: &JobHandle,
        media: &FetchedMedia,
        language: &str,
    ) -> Result<String, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Transcribe, "Transcribing audio...", 35))?;

        if let Some(cached) = self.cache.load(&media.media_id, TextKind::Transcription, language).await {
            debug!(media_id = %media.media_id, "Transcription cache hit");
            self.report(handle, ProgressUpdate::new(Stage::Transcribe, "Using cached transcription", 40))?;
            return Ok(cached);
        }

        let started = Instant::now();
        let text = self
            .collaborators
            .transcriber
            .transcribe(&media.path, language)
            .await
            .map_err(|e| PipelineError::Transcription(e.detail().to_string()))?;
        observe_stage(Stage::Transcribe, started);

        self.cache
            .store(&media.media_id, TextKind::Transcription, language, &text)
            .await;
        self.report(handle, ProgressUpdate::new(Stage::Transcribe, "Audio transcribed", 50))?;
        Ok(text)
    }

    /// On-screen text. Best-effort: failures leave the run without it.
    async fn read_screen(
        &self,
        handle: &JobHandle,
        media: &FetchedMedia,
        language: &str,
    ) -> Result<Option<String>, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Visual, "Extracting on-screen text...", 55))?;

        let visual = if let Some(cached) = self.cache.load(&media.media_id, TextKind::Visual, language).await {
            self.report(handle, ProgressUpdate::new(Stage::Visual, "Using cached visual text", 60))?;
            Some(cached)
        } else if let Some(extractor) = &self.collaborators.visual_text {
            let started = Instant::now();
            let result = extractor.extract_text(&media.path, language).await;
            observe_stage(Stage::Visual, started);
            match result {
                Ok(text) => {
                    self.cache.store(&media.media_id, TextKind::Visual, language, &text).await;
                    Some(text)
                }
                Err(e) => {
                    warn!(job_id = %handle.job_id(), error = %e, "On-screen text extraction failed");
                    self.report(
                        handle,
                        ProgressUpdate::new(
                            Stage::Visual,
                            format!("Warning: Could not extract visual text: {}", e.detail()),
                            60,
                        ),
                    )?;
                    None
                }
            }
        } else {
            None
        };

        let message = if visual.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            "Visual text extracted"
        } else {
            "No on-screen text found"
        };
        self.report(handle, ProgressUpdate::new(Stage::Visual, message, 65))?;
        Ok(visual)
    }

    /// Dish image candidates. Best-effort: failures yield none.
    async fn pick_images(
        &self,
        handle: &JobHandle,
        media: &FetchedMedia,
    ) -> Result<ImageCandidates, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Image, "Extracting dish image...", 70))?;
        let started = Instant::now();

        let candidates = match self.collaborators.images.extract_candidates(&media.path).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(job_id = %handle.job_id(), error = %e, "Image extraction failed");
                self.report(
                    handle,
                    ProgressUpdate::new(
                        Stage::Image,
                        format!("Warning: Could not extract image: {}", e.detail()),
                        75,
                    ),
                )?;
                ImageCandidates::empty()
            }
        };
        observe_stage(Stage::Image, started);

        let message = if candidates.is_empty() {
            "No dish image found".to_string()
        } else {
            format!("Image extracted ({} candidates)", candidates.paths.len())
        };
        self.report(handle, ProgressUpdate::new(Stage::Image, message, 80))?;
        Ok(candidates)
    }

    async fn generate(
        &self,
        job: &Job,
        handle: &JobHandle,
        media: &FetchedMedia,
        transcript: &str,
    ) -> Result<RecipePayload, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Evaluate, "Creating recipe with AI...", 85))?;
        let started = Instant::now();

        let recipe = self
            .collaborators
            .generator
            .generate(&job.url, &media.description, transcript)
            .await
            .map_err(|e| PipelineError::Generation(e.detail().to_string()))?;
        observe_stage(Stage::Evaluate, started);

        self.report(handle, ProgressUpdate::new(Stage::Evaluate, "Recipe created successfully", 90))?;
        Ok(recipe)
    }

    /// Park at the gate. Returns the image the human chose.
    async fn await_confirmation(
        &self,
        job: &Job,
        handle: &JobHandle,
        recipe: &RecipePayload,
        candidates: &ImageCandidates,
        targets: Vec<ExportTarget>,
    ) -> Result<Option<PathBuf>, PipelineError> {
        self.report(handle, ProgressUpdate::new(Stage::Preview, "Waiting for your confirmation...", 90))?;

        let upload = self
            .gate
            .open(&job.id, recipe.clone(), candidates, targets)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        self.publisher.emit_preview(&upload);

        let started = Instant::now();
        let outcome = self
            .gate
            .wait(&upload, handle)
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        observe_stage(Stage::Preview, started);

        match outcome {
            ConfirmationOutcome::Confirmed(resolved) => Ok(resolved.selected_image().map(PathBuf::from)),
            ConfirmationOutcome::Cancelled => Err(PipelineError::UploadCancelled),
            ConfirmationOutcome::TimedOut => Err(PipelineError::ConfirmationTimedOut),
            ConfirmationOutcome::JobCancelled => Err(PipelineError::Cancelled),
        }
    }

    /// One call per target. Returns (succeeded, failed) target names;
    /// fails only when no target accepted the recipe.
    async fn export(
        &self,
        job: &Job,
        exporters: &[Arc<dyn RecipeExporter>],
        recipe: &RecipePayload,
        image: Option<&Path>,
    ) -> Result<(Vec<String>, Vec<String>), PipelineError> {
        if exporters.is_empty() {
            return Err(PipelineError::Export("no upload targets configured".to_string()));
        }

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        let mut errors = Vec::new();

        for exporter in exporters {
            let target = exporter.target();
            match exporter.export(recipe, image).await {
                Ok(external_id) => {
                    metrics::EXPORTS.with_label_values(&[target.as_str(), "success"]).inc();
                    info!(job_id = %job.id, target = %target, external_id = %external_id, "Recipe uploaded");
                    uploaded.push(target.to_string());
                }
                Err(e) => {
                    metrics::EXPORTS.with_label_values(&[target.as_str(), "error"]).inc();
                    warn!(job_id = %job.id, target = %target, error = %e, "Recipe upload failed");
                    errors.push(format!("{}: {}", target, e.detail()));
                    failed.push(target.to_string());
                }
            }
        }

        if uploaded.is_empty() {
            return Err(PipelineError::Export(errors.join("; ")));
        }
        Ok((uploaded, failed))
    }

    /// Checkpoint, then publish. A refused update means the job was finished
    /// by someone else, which ends the run like a cancellation.
    fn report(&self, handle: &JobHandle, update: ProgressUpdate) -> Result<(), PipelineError> {
        handle.checkpoint()?;
        match self.publisher.update_progress(handle.job_id(), update) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PipelineError::Cancelled),
            Err(e) => Err(PipelineError::Internal(e.to_string())),
        }
    }
}

#[async_trait]
impl PipelineBody for ExtractionPipeline {
    async fn run(&self, job: Job, handle: JobHandle) {
        let mut state = RunState::default();
        let result = self.execute(&job, &handle, &mut state).await;

        let finished = match result {
            Ok(completion) => {
                info!(job_id = %job.id, uploaded_to = ?completion.uploaded_to, "Pipeline completed");
                self.publisher.complete_job(&job.id, completion)
            }
            Err(PipelineError::Cancelled) => {
                info!(job_id = %job.id, "Pipeline stopped");
                // No-op unless the flag was raised without a store update
                self.publisher.cancel_job(&job.id, CANCELLED_BY_USER, state.recipe)
            }
            Err(err @ PipelineError::UploadCancelled) => {
                info!(job_id = %job.id, "Upload cancelled by user");
                self.publisher.cancel_job(&job.id, &err.to_string(), state.recipe)
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    error = %err,
                    orchestration = err.is_orchestration(),
                    "Pipeline failed"
                );
                self.publisher.fail_job(&job.id, &err.to_string(), state.recipe)
            }
        };

        if let Err(e) = finished {
            error!(job_id = %job.id, error = %e, "Failed to record pipeline outcome");
        }
    }
}

/// Audio transcript, plus the on-screen text section when there is any.
pub fn combine_transcript(audio: &str, visual: Option<&str>) -> String {
    match visual.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => format!(
            "=== AUDIO TRANSCRIPTION ===\n{}\n\n=== ON-SCREEN TEXT (ingredients, instructions, etc.) ===\n{}",
            audio, text
        ),
        None => audio.to_string(),
    }
}

fn observe_stage(stage: Stage, started: Instant) {
    metrics::STAGE_DURATION
        .with_label_values(&[stage.as_str()])
        .observe(started.elapsed().as_secs_f64());
}
