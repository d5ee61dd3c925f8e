pub mod adapters;
pub mod collaborator;
pub mod config;
pub mod confirmation;
pub mod history;
pub mod job;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod scheduler;
pub mod settings;
pub mod testing;

pub use collaborator::{CollaboratorError, ExportTarget, FetchedMedia, ImageCandidates, RecipePayload};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use confirmation::{
    ConfirmationConfig, ConfirmationGate, ConfirmationOutcome, PendingUpload, PendingUploadError,
    PendingUploadStore, SqlitePendingUploadStore,
};
pub use history::{HistoryEntry, HistoryFilter, HistoryStatus, HistoryStore, SqliteHistoryStore};
pub use job::{Job, JobFilter, JobStatus, JobStore, JobStoreError, SqliteJobStore, Stage};
pub use pipeline::{Collaborators, ExtractionPipeline, PipelineConfig, PipelineError};
pub use progress::{JobEvent, ProgressPublisher};
pub use recovery::{run_recovery_sweep, RecoveryReport};
pub use scheduler::{JobHandle, PipelineBody, Scheduler, SchedulerConfig, SchedulerError};
pub use settings::{RuntimeSettings, SettingsPatch, SettingsService, SettingsStore, SqliteSettingsStore};
