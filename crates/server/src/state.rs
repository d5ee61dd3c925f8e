use std::sync::Arc;

use social_recipes_core::{
    Config, ConfirmationGate, HistoryStore, JobStore, PipelineBody, ProgressPublisher,
    RecoveryReport, SanitizedConfig, Scheduler, SettingsService,
};

/// Shared application state
pub struct AppState {
    config: Config,
    scheduler: Arc<Scheduler>,
    history: Arc<dyn HistoryStore>,
    gate: Arc<ConfirmationGate>,
    pipeline: Arc<dyn PipelineBody>,
    settings: Arc<SettingsService>,
    recovery: RecoveryReport,
}

impl AppState {
    pub fn new(
        config: Config,
        scheduler: Arc<Scheduler>,
        history: Arc<dyn HistoryStore>,
        gate: Arc<ConfirmationGate>,
        pipeline: Arc<dyn PipelineBody>,
        settings: Arc<SettingsService>,
        recovery: RecoveryReport,
    ) -> Self {
        Self {
            config,
            scheduler,
            history,
            gate,
            pipeline,
            settings,
            recovery,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        self.scheduler.publisher()
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        self.scheduler.publisher().jobs()
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    /// The body every submitted job runs.
    pub fn pipeline(&self) -> Arc<dyn PipelineBody> {
        Arc::clone(&self.pipeline)
    }

    /// Runtime-editable settings.
    pub fn settings(&self) -> &Arc<SettingsService> {
        &self.settings
    }

    /// What the startup recovery sweep changed.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }
}
