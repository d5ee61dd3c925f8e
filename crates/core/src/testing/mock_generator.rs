//! Mock recipe generator for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborator::{CollaboratorError, RecipeGenerator, RecipePayload};

/// A recorded generation request.
#[derive(Debug, Clone)]
pub struct RecordedGeneration {
    pub source_url: String,
    pub description: String,
    pub transcript: String,
}

/// Mock implementation of the RecipeGenerator trait.
///
/// Returns the configured recipe with `url` set to the source URL.
#[derive(Debug, Clone)]
pub struct MockRecipeGenerator {
    recipe: Arc<RwLock<RecipePayload>>,
    requests: Arc<RwLock<Vec<RecordedGeneration>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl Default for MockRecipeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecipeGenerator {
    pub fn new() -> Self {
        Self {
            recipe: Arc::new(RwLock::new(super::fixtures::recipe("Shakshuka"))),
            requests: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_recipe(&self, recipe: RecipePayload) {
        *self.recipe.write().await = recipe;
    }

    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Requests received so far.
    pub async fn recorded_requests(&self) -> Vec<RecordedGeneration> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl RecipeGenerator for MockRecipeGenerator {
    async fn generate(
        &self,
        source_url: &str,
        description: &str,
        transcript: &str,
    ) -> Result<RecipePayload, CollaboratorError> {
        self.requests.write().await.push(RecordedGeneration {
            source_url: source_url.to_string(),
            description: description.to_string(),
            transcript: transcript.to_string(),
        });

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let mut recipe = self.recipe.read().await.clone();
        if let Some(object) = recipe.as_object_mut() {
            object.insert("url".to_string(), source_url.into());
        }
        Ok(recipe)
    }
}
