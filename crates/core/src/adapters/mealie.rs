//! Mealie recipe manager exporter.
//!
//! Mealie creates a recipe from a name alone and returns its slug; the rest
//! of the recipe is applied with a follow-up PATCH.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::recipe_api::{keywords, text_field, text_list, RecipeApiClient};
use crate::collaborator::{CollaboratorError, ExportTarget, RecipeExporter, RecipePayload};
use crate::config::RecipeManagerConfig;

pub struct MealieExporter {
    api: RecipeApiClient,
}

impl MealieExporter {
    pub fn new(config: &RecipeManagerConfig) -> Self {
        Self {
            api: RecipeApiClient::new(config),
        }
    }
}

/// Body of the PATCH that fills in a freshly created recipe.
pub fn mealie_patch(recipe: &RecipePayload) -> Value {
    let ingredients: Vec<Value> = text_list(recipe.get("recipeIngredient"))
        .into_iter()
        .map(|line| json!({ "note": line, "display": line }))
        .collect();
    let instructions: Vec<Value> = text_list(recipe.get("recipeInstructions"))
        .into_iter()
        .map(|text| json!({ "text": text }))
        .collect();
    let tags: Vec<Value> = keywords(recipe)
        .into_iter()
        .map(|name| json!({ "name": name }))
        .collect();

    let mut patch = json!({
        "description": text_field(recipe, "description"),
        "orgURL": text_field(recipe, "url"),
        "recipeIngredient": ingredients,
        "recipeInstructions": instructions,
        "tags": tags,
    });

    for (schema_key, mealie_key) in [
        ("recipeYield", "recipeYield"),
        ("prepTime", "prepTime"),
        ("cookTime", "performTime"),
        ("totalTime", "totalTime"),
    ] {
        if let Some(value) = recipe.get(schema_key) {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            patch[mealie_key] = Value::String(text);
        }
    }
    patch
}

#[async_trait]
impl RecipeExporter for MealieExporter {
    fn target(&self) -> ExportTarget {
        ExportTarget::Mealie
    }

    async fn export(
        &self,
        recipe: &RecipePayload,
        image: Option<&Path>,
    ) -> Result<String, CollaboratorError> {
        let name = text_field(recipe, "name");
        let created = self
            .api
            .send_json(Method::POST, "/api/recipes", &json!({ "name": name }))
            .await
            .map_err(CollaboratorError::Export)?;

        let slug = match created {
            Value::String(slug) if !slug.is_empty() => slug,
            other => {
                return Err(CollaboratorError::Export(format!(
                    "Mealie returned no recipe slug: {}",
                    other
                )))
            }
        };

        self.api
            .send_json(Method::PATCH, &format!("/api/recipes/{}", slug), &mealie_patch(recipe))
            .await
            .map_err(CollaboratorError::Export)?;
        info!(slug = %slug, "Recipe created in Mealie");

        if let Some(image) = image {
            let extension = image
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "jpg".to_string());
            let path = format!("/api/recipes/{}/image", slug);
            if let Err(e) = self
                .api
                .upload_image(Method::PUT, &path, image, &[("extension", extension)])
                .await
            {
                warn!(slug = %slug, error = %e, "Mealie image upload failed");
            }
        }

        Ok(slug)
    }
}
