//! Tandoor recipe manager exporter.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::recipe_api::{
    iso_duration_minutes, keywords, servings, text_field, text_list, RecipeApiClient,
};
use crate::collaborator::{CollaboratorError, ExportTarget, RecipeExporter, RecipePayload};
use crate::config::RecipeManagerConfig;

// Tandoor rejects longer values outright.
const MAX_NAME_CHARS: usize = 128;
const MAX_DESCRIPTION_CHARS: usize = 512;

pub struct TandoorExporter {
    api: RecipeApiClient,
}

impl TandoorExporter {
    pub fn new(config: &RecipeManagerConfig) -> Self {
        Self {
            api: RecipeApiClient::new(config),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Map a schema.org recipe onto Tandoor's recipe create body.
///
/// Ingredients are sent unparsed as notes on the first step.
pub fn tandoor_payload(recipe: &RecipePayload) -> Value {
    let ingredients: Vec<Value> = text_list(recipe.get("recipeIngredient"))
        .into_iter()
        .map(|line| {
            json!({
                "food": null,
                "unit": null,
                "amount": 0,
                "note": line,
                "original_text": line,
                "no_amount": true,
                "is_header": false,
            })
        })
        .collect();

    let mut steps: Vec<Value> = text_list(recipe.get("recipeInstructions"))
        .into_iter()
        .map(|text| json!({ "instruction": text, "ingredients": [] }))
        .collect();
    if steps.is_empty() {
        steps.push(json!({ "instruction": "", "ingredients": [] }));
    }
    steps[0]["ingredients"] = Value::Array(ingredients);

    let keywords: Vec<Value> = keywords(recipe)
        .into_iter()
        .map(|name| json!({ "name": name }))
        .collect();

    json!({
        "name": truncate(&text_field(recipe, "name"), MAX_NAME_CHARS),
        "description": truncate(&text_field(recipe, "description"), MAX_DESCRIPTION_CHARS),
        "source_url": text_field(recipe, "url"),
        "servings": servings(recipe).unwrap_or(1),
        "working_time": iso_duration_minutes(recipe, "prepTime").unwrap_or(0),
        "waiting_time": iso_duration_minutes(recipe, "cookTime").unwrap_or(0),
        "keywords": keywords,
        "steps": steps,
        "internal": true,
    })
}

#[async_trait]
impl RecipeExporter for TandoorExporter {
    fn target(&self) -> ExportTarget {
        ExportTarget::Tandoor
    }

    async fn export(
        &self,
        recipe: &RecipePayload,
        image: Option<&Path>,
    ) -> Result<String, CollaboratorError> {
        let created = self
            .api
            .send_json(Method::POST, "/api/recipe/", &tandoor_payload(recipe))
            .await
            .map_err(CollaboratorError::Export)?;

        let id = match created.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(CollaboratorError::Export(
                    "Tandoor response has no recipe id".to_string(),
                ))
            }
        };
        info!(recipe_id = %id, "Recipe created in Tandoor");

        if let Some(image) = image {
            let path = format!("/api/recipe/{}/image/", id);
            if let Err(e) = self.api.upload_image(Method::PUT, &path, image, &[]).await {
                warn!(recipe_id = %id, error = %e, "Tandoor image upload failed");
            }
        }

        Ok(id)
    }
}
