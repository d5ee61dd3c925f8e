//! Resolves persisted overrides against the file configuration.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::types::keys;
use super::{RuntimeSettings, SettingsError, SettingsPatch, SettingsStore};
use crate::collaborator::ExportTarget;

/// Runtime-editable settings.
///
/// `defaults` come from the file configuration; stored rows override them.
/// Jobs take a snapshot with [`current`](Self::current) when they start, so
/// a change applies to jobs started afterward.
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    defaults: RuntimeSettings,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: RuntimeSettings) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &RuntimeSettings {
        &self.defaults
    }

    /// Targets an update may choose from: the ones with a configured exporter.
    pub fn available_targets(&self) -> &[ExportTarget] {
        &self.defaults.output_targets
    }

    /// Effective settings. A store that cannot be read yields the defaults,
    /// and a row that cannot be decoded is skipped.
    pub fn current(&self) -> RuntimeSettings {
        let rows = match self.store.all() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to read settings, using defaults");
                return self.defaults.clone();
            }
        };

        let mut settings = self.defaults.clone();
        for (key, value) in rows {
            match key.as_str() {
                keys::CONFIRM_BEFORE_UPLOAD => {
                    if let Some(v) = decode(&key, &value) {
                        settings.confirm_before_upload = v;
                    }
                }
                keys::LANGUAGE => {
                    if let Some(v) = decode(&key, &value) {
                        settings.language = v;
                    }
                }
                keys::OUTPUT_TARGETS => {
                    if let Some(v) = decode::<Vec<ExportTarget>>(&key, &value) {
                        // Drop targets whose exporter is no longer configured
                        let kept: Vec<_> = v
                            .into_iter()
                            .filter(|t| self.available_targets().contains(t))
                            .collect();
                        if !kept.is_empty() {
                            settings.output_targets = kept;
                        }
                    }
                }
                other => warn!(key = other, "Ignoring unknown setting"),
            }
        }
        settings
    }

    /// Validate and persist a partial update. Returns the new effective settings.
    pub fn update(&self, patch: SettingsPatch) -> Result<RuntimeSettings, SettingsError> {
        let mut rows: Vec<(&str, String)> = Vec::new();

        if let Some(confirm) = patch.confirm_before_upload {
            rows.push((keys::CONFIRM_BEFORE_UPLOAD, serde_json::to_string(&confirm)?));
        }

        if let Some(language) = patch.language {
            let language = language.trim();
            if language.is_empty() {
                return Err(SettingsError::Invalid("language cannot be empty".to_string()));
            }
            rows.push((keys::LANGUAGE, serde_json::to_string(language)?));
        }

        if let Some(targets) = patch.output_targets {
            self.validate_targets(&targets)?;
            rows.push((keys::OUTPUT_TARGETS, serde_json::to_string(&targets)?));
        }

        if !rows.is_empty() {
            self.store.set_many(&rows)?;
            let changed: Vec<&str> = rows.iter().map(|(k, _)| *k).collect();
            info!(changed = ?changed, "Settings updated");
        }
        Ok(self.current())
    }

    /// Drop every override.
    pub fn reset(&self) -> Result<RuntimeSettings, SettingsError> {
        self.store.clear()?;
        info!("Settings reset to configured defaults");
        Ok(self.defaults.clone())
    }

    fn validate_targets(&self, targets: &[ExportTarget]) -> Result<(), SettingsError> {
        if targets.is_empty() {
            return Err(SettingsError::Invalid(
                "at least one output target is required".to_string(),
            ));
        }
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].contains(target) {
                return Err(SettingsError::Invalid(format!(
                    "output target '{}' listed twice",
                    target
                )));
            }
            if !self.available_targets().contains(target) {
                return Err(SettingsError::Invalid(format!(
                    "output target '{}' has no configured exporter",
                    target
                )));
            }
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &str) -> Option<T> {
    match serde_json::from_str(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, error = %e, "Ignoring undecodable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SqliteSettingsStore;

    fn service() -> SettingsService {
        SettingsService::new(
            Arc::new(SqliteSettingsStore::in_memory().unwrap()),
            RuntimeSettings {
                confirm_before_upload: false,
                language: "he".to_string(),
                output_targets: vec![ExportTarget::Tandoor, ExportTarget::Mealie],
            },
        )
    }

    #[test]
    fn test_current_without_rows_is_defaults() {
        let service = service();
        assert_eq!(&service.current(), service.defaults());
    }

    #[test]
    fn test_update_merges_and_persists() {
        let service = service();

        let updated = service
            .update(SettingsPatch {
                confirm_before_upload: Some(true),
                language: Some(" en ".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(updated.confirm_before_upload);
        assert_eq!(updated.language, "en");
        assert_eq!(
            updated.output_targets,
            vec![ExportTarget::Tandoor, ExportTarget::Mealie]
        );

        let updated = service
            .update(SettingsPatch {
                output_targets: Some(vec![ExportTarget::Mealie]),
                ..Default::default()
            })
            .unwrap();
        // Earlier fields are kept
        assert!(updated.confirm_before_upload);
        assert_eq!(updated.output_targets, vec![ExportTarget::Mealie]);
        assert_eq!(service.current(), updated);
    }

    #[test]
    fn test_update_rejects_invalid_values() {
        let service = SettingsService::new(
            Arc::new(SqliteSettingsStore::in_memory().unwrap()),
            RuntimeSettings {
                confirm_before_upload: false,
                language: "he".to_string(),
                output_targets: vec![ExportTarget::Tandoor],
            },
        );

        let err = service
            .update(SettingsPatch {
                language: Some("   ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        for targets in [
            vec![],
            vec![ExportTarget::Mealie],
            vec![ExportTarget::Tandoor, ExportTarget::Tandoor],
        ] {
            let err = service
                .update(SettingsPatch {
                    output_targets: Some(targets),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, SettingsError::Invalid(_)));
        }

        // A rejected patch writes nothing, even its valid fields
        let err = service.update(SettingsPatch {
            confirm_before_upload: Some(true),
            output_targets: Some(vec![]),
            ..Default::default()
        });
        assert!(err.is_err());
        assert!(!service.current().confirm_before_upload);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let service = service();
        service
            .update(SettingsPatch {
                language: Some("en".to_string()),
                ..Default::default()
            })
            .unwrap();

        let reset = service.reset().unwrap();
        assert_eq!(&reset, service.defaults());
        assert_eq!(service.current().language, "he");
    }

    #[test]
    fn test_bad_rows_fall_back_to_defaults() {
        let store = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        store
            .set_many(&[
                (keys::LANGUAGE, "not json".to_string()),
                (keys::OUTPUT_TARGETS, "[\"mealie\"]".to_string()),
                ("theme", "\"dark\"".to_string()),
            ])
            .unwrap();

        let service = SettingsService::new(
            store,
            RuntimeSettings {
                confirm_before_upload: false,
                language: "he".to_string(),
                output_targets: vec![ExportTarget::Tandoor],
            },
        );
        let current = service.current();
        assert_eq!(current.language, "he");
        // Mealie is not configured any more
        assert_eq!(current.output_targets, vec![ExportTarget::Tandoor]);
    }
}
