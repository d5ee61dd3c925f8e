//! Spy exporter for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborator::{CollaboratorError, ExportTarget, RecipeExporter, RecipePayload};

/// A recorded export call.
#[derive(Debug, Clone)]
pub struct RecordedExport {
    pub recipe: RecipePayload,
    pub image: Option<PathBuf>,
    /// Whether the call returned success.
    pub success: bool,
}

/// Mock implementation of the RecipeExporter trait.
///
/// Records every call so tests can assert that nothing was uploaded.
#[derive(Debug, Clone)]
pub struct MockExporter {
    target: ExportTarget,
    exports: Arc<RwLock<Vec<RecordedExport>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
    /// Fail every call, not just the next one.
    always_fail: Arc<RwLock<Option<String>>>,
}

impl MockExporter {
    pub fn new(target: ExportTarget) -> Self {
        Self {
            target,
            exports: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            always_fail: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every export fail with this message.
    pub async fn set_always_fail(&self, message: impl Into<String>) {
        *self.always_fail.write().await = Some(message.into());
    }

    pub async fn recorded_exports(&self) -> Vec<RecordedExport> {
        self.exports.read().await.clone()
    }

    pub async fn export_count(&self) -> usize {
        self.exports.read().await.len()
    }
}

#[async_trait]
impl RecipeExporter for MockExporter {
    fn target(&self) -> ExportTarget {
        self.target
    }

    async fn export(
        &self,
        recipe: &RecipePayload,
        image: Option<&Path>,
    ) -> Result<String, CollaboratorError> {
        let error = match self.next_error.write().await.take() {
            Some(err) => Some(err),
            None => self
                .always_fail
                .read()
                .await
                .clone()
                .map(CollaboratorError::Export),
        };

        let mut exports = self.exports.write().await;
        exports.push(RecordedExport {
            recipe: recipe.clone(),
            image: image.map(Path::to_path_buf),
            success: error.is_none(),
        });

        match error {
            Some(err) => Err(err),
            None => Ok(format!("{}-{}", self.target, exports.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let exporter = MockExporter::new(ExportTarget::Mealie);
        let id = exporter.export(&json!({"name": "A"}), None).await.unwrap();
        assert_eq!(id, "mealie-1");

        exporter.set_always_fail("HTTP 500").await;
        let err = exporter
            .export(&json!({"name": "B"}), Some(Path::new("f.jpg")))
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "HTTP 500");

        let exports = exporter.recorded_exports().await;
        assert_eq!(exports.len(), 2);
        assert!(exports[0].success);
        assert!(!exports[1].success);
        assert_eq!(exports[1].image.as_deref(), Some(Path::new("f.jpg")));
    }
}
