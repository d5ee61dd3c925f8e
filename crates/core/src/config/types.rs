use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::collaborator::ExportTarget;
use crate::confirmation::ConfirmationConfig;
use crate::pipeline::PipelineConfig;
use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    5006
}

/// Database configuration.
/// Job, history and pending-upload stores all live in this file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("social_recipes.db")
}

/// yt-dlp video fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_yt_dlp_path")]
    pub yt_dlp_path: PathBuf,
    /// Download timeout in seconds (default: 600)
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: default_yt_dlp_path(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_yt_dlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_fetch_timeout() -> u64 {
    600
}

/// Whisper transcriber configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriberConfig {
    #[serde(default = "default_whisper_path")]
    pub whisper_path: PathBuf,
    /// Whisper model name (tiny, base, small, medium, large)
    #[serde(default = "default_whisper_model")]
    pub model: String,
    /// Transcription timeout in seconds (default: 1800)
    #[serde(default = "default_transcribe_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            whisper_path: default_whisper_path(),
            model: default_whisper_model(),
            timeout_secs: default_transcribe_timeout(),
        }
    }
}

fn default_whisper_path() -> PathBuf {
    PathBuf::from("whisper")
}

fn default_whisper_model() -> String {
    "small".to_string()
}

fn default_transcribe_timeout() -> u64 {
    1800
}

/// Dish image extraction configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Frames sampled as dish image candidates (default: 12)
    #[serde(default = "default_candidate_count")]
    pub candidate_count: usize,
    /// Vision model that picks the dish photo among the frames
    #[serde(default)]
    pub selector: ImageSelectorKind,
    /// Sharpen the chosen frame (default: true)
    #[serde(default = "default_true")]
    pub enhance: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            candidate_count: default_candidate_count(),
            selector: ImageSelectorKind::default(),
            enhance: true,
        }
    }
}

/// Provider of the dish frame choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSelectorKind {
    /// Always the last sampled frame.
    None,
    /// The `[llm]` endpoint, which must accept images.
    #[default]
    OpenAi,
    /// Google Gemini, configured in `[gemini]`.
    Gemini,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_candidate_count() -> usize {
    12
}

fn default_true() -> bool {
    true
}

/// Recipe generation (OpenAI-compatible chat completions API)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// API key. Usually supplied as RECIPES_LLM__API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Attempts before giving up on malformed output (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Language the recipe is written in. Defaults to the video's language.
    #[serde(default)]
    pub recipe_language: Option<String>,
    /// Request timeout in seconds (default: 120)
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Estimate servings and nutrition when the recipe lacks them (default: true)
    #[serde(default = "default_true")]
    pub enrich_nutrition: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            max_attempts: default_max_attempts(),
            recipe_language: None,
            timeout_secs: default_llm_timeout(),
            enrich_nutrition: true,
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_llm_timeout() -> u64 {
    120
}

/// Google Gemini API, used for dish frame selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// API key. Usually supplied as RECIPES_GEMINI__API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            api_key: String::new(),
            model: default_gemini_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Recipe manager upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Targets to upload to, in order
    #[serde(default = "default_targets")]
    pub targets: Vec<ExportTarget>,
    #[serde(default)]
    pub tandoor: Option<RecipeManagerConfig>,
    #[serde(default)]
    pub mealie: Option<RecipeManagerConfig>,
}

impl ExportConfig {
    /// Connection settings for a target, if configured.
    pub fn target_config(&self, target: ExportTarget) -> Option<&RecipeManagerConfig> {
        match target {
            ExportTarget::Tandoor => self.tandoor.as_ref(),
            ExportTarget::Mealie => self.mealie.as_ref(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            tandoor: None,
            mealie: None,
        }
    }
}

fn default_targets() -> Vec<ExportTarget> {
    vec![ExportTarget::Tandoor]
}

/// Connection to one recipe manager instance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecipeManagerConfig {
    /// Base URL (e.g., "http://localhost:8080")
    pub host: String,
    /// API token
    pub api_key: String,
    /// Request timeout in seconds (default: 120)
    #[serde(default = "default_export_timeout")]
    pub timeout_secs: u64,
}

fn default_export_timeout() -> u64 {
    120
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub confirmation: ConfirmationConfig,
    pub pipeline: PipelineConfig,
    pub images: ImagesConfig,
    pub llm: SanitizedLlmConfig,
    pub gemini: SanitizedGeminiConfig,
    pub export: SanitizedExportConfig,
}

/// Sanitized LLM config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLlmConfig {
    pub base_url: String,
    pub model: String,
    pub max_attempts: u32,
    pub enrich_nutrition: bool,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGeminiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedExportConfig {
    pub targets: Vec<ExportTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tandoor: Option<SanitizedRecipeManagerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mealie: Option<SanitizedRecipeManagerConfig>,
}

/// Sanitized recipe manager config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRecipeManagerConfig {
    pub host: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&RecipeManagerConfig> for SanitizedRecipeManagerConfig {
    fn from(config: &RecipeManagerConfig) -> Self {
        Self {
            host: config.host.clone(),
            api_key_configured: !config.api_key.is_empty(),
            timeout_secs: config.timeout_secs,
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            scheduler: config.scheduler.clone(),
            confirmation: config.confirmation.clone(),
            pipeline: config.pipeline.clone(),
            images: config.images.clone(),
            llm: SanitizedLlmConfig {
                base_url: config.llm.base_url.clone(),
                model: config.llm.model.clone(),
                max_attempts: config.llm.max_attempts,
                enrich_nutrition: config.llm.enrich_nutrition,
                api_key_configured: !config.llm.api_key.is_empty(),
            },
            gemini: SanitizedGeminiConfig {
                base_url: config.gemini.base_url.clone(),
                model: config.gemini.model.clone(),
                api_key_configured: !config.gemini.api_key.is_empty(),
            },
            export: SanitizedExportConfig {
                targets: config.export.targets.clone(),
                tandoor: config.export.tandoor.as_ref().map(Into::into),
                mealie: config.export.mealie.as_ref().map(Into::into),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5006);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "social_recipes.db");
        assert_eq!(config.scheduler.max_concurrent_jobs, 3);
        assert!(!config.confirmation.enabled);
        assert_eq!(config.confirmation.timeout_secs, 300);
        assert_eq!(config.pipeline.language, "he");
        assert_eq!(config.transcriber.model, "small");
        assert_eq!(config.images.candidate_count, 12);
        assert_eq!(config.images.selector, ImageSelectorKind::OpenAi);
        assert!(config.images.enhance);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.llm.max_attempts, 3);
        assert!(config.llm.enrich_nutrition);
        assert_eq!(config.export.targets, vec![ExportTarget::Tandoor]);
    }

    #[test]
    fn test_deserialize_export_targets() {
        let toml = r#"
[export]
targets = ["tandoor", "mealie"]

[export.mealie]
host = "http://mealie.local:9000"
api_key = "mealie-token"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.export.targets,
            vec![ExportTarget::Tandoor, ExportTarget::Mealie]
        );
        assert!(config.export.target_config(ExportTarget::Tandoor).is_none());

        let mealie = config.export.target_config(ExportTarget::Mealie).unwrap();
        assert_eq!(mealie.host, "http://mealie.local:9000");
        assert_eq!(mealie.timeout_secs, 120); // default
    }

    #[test]
    fn test_deserialize_gemini_selector() {
        let toml = r#"
[images]
selector = "gemini"
enhance = false

[gemini]
api_key = "g-key"
model = "gemini-2.5-flash"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.images.selector, ImageSelectorKind::Gemini);
        assert!(!config.images.enhance);
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(
            config.gemini.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn test_deserialize_unknown_target_fails() {
        let toml = r#"
[export]
targets = ["paprika"]
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_keys() {
        let mut config = Config::default();
        config.llm.api_key = "sk-secret".to_string();
        config.gemini.api_key = "gemini-secret".to_string();
        config.export.tandoor = Some(RecipeManagerConfig {
            host: "http://tandoor.local".to_string(),
            api_key: "tandoor-secret".to_string(),
            timeout_secs: 60,
        });

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.llm.api_key_configured);
        let tandoor = sanitized.export.tandoor.as_ref().unwrap();
        assert!(tandoor.api_key_configured);
        assert_eq!(tandoor.timeout_secs, 60);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("tandoor-secret"));
        assert!(!json.contains("gemini-secret"));
        assert!(sanitized.gemini.api_key_configured);
    }
}
