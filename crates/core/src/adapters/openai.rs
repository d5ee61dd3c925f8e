//! Recipe generation through an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::collaborator::{CollaboratorError, RecipeGenerator, RecipePayload};
use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "You turn cooking videos into recipes. Reply with a single JSON object \
following the schema.org Recipe type: name, description, recipeYield, prepTime, cookTime, \
totalTime (ISO 8601 durations), recipeIngredient (array of strings), recipeInstructions \
(array of HowToStep objects with a text field), keywords. Use only information present in the \
video. Do not add commentary.";

const ESTIMATE_PROMPT: &str = "You estimate servings and nutrition for a recipe from its ingredients \
and instructions. Reply with a single JSON object: recipeYield (string such as \"4 servings\", in \
the requested language), servings (integer), nutrition (object with per-serving schema.org \
NutritionInformation fields: calories, proteinContent, fatContent, carbohydrateContent, \
fiberContent, sugarContent, sodiumContent, cholesterolContent, each a string with units).";

/// Nutrition fields copied from an estimate.
const NUTRITION_FIELDS: [&str; 8] = [
    "calories",
    "proteinContent",
    "fatContent",
    "carbohydrateContent",
    "fiberContent",
    "sugarContent",
    "sodiumContent",
    "cholesterolContent",
];

/// Generates schema.org recipes with a chat completions endpoint.
///
/// Transport and API errors fail immediately. Replies that are not a usable
/// recipe are retried up to `max_attempts` times. With `enrich_nutrition`
/// on, a recipe missing its yield or nutrition gets a second, best-effort
/// call that estimates them.
pub struct OpenAiRecipeGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    language: String,
}

impl OpenAiRecipeGenerator {
    /// `language` is used when the config does not name a recipe language.
    pub fn new(config: LlmConfig, language: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        let language = config.recipe_language.clone().unwrap_or_else(|| language.into());

        Self {
            client,
            config,
            language,
        }
    }

    fn prompt(&self, source_url: &str, description: &str, transcript: &str) -> String {
        format!(
            "Write the recipe in language '{}'.\n\nSource URL: {}\n\nVideo description:\n{}\n\nTranscript:\n{}",
            self.language, source_url, description, transcript
        )
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!(
                "API error: {} - {}",
                status.as_u16(),
                api_error_message(error_text)
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid API response: {}", e))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "API returned no content".to_string())
    }

    /// Fill in a missing yield or nutrition. Failures leave the recipe as is.
    async fn enrich(&self, recipe: &mut RecipePayload) {
        let (need_yield, need_nutrition) = missing_estimates(recipe);
        if !(need_yield || need_nutrition) {
            return;
        }

        let request = estimate_request(recipe, &self.language);
        let reply = match self.complete(ESTIMATE_PROMPT, &request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Servings and nutrition estimate failed");
                return;
            }
        };
        match apply_estimate(recipe, &reply) {
            Ok(()) => debug!(need_yield, need_nutrition, "Recipe enriched"),
            Err(e) => warn!(error = %e, "Unusable servings and nutrition estimate"),
        }
    }
}

/// Message of an `{"error": {"message": ..}}` body, or the body itself.
/// OpenAI and Gemini share this shape.
pub(super) fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Validate a model reply as a recipe and fill in source fields.
pub fn parse_recipe(reply: &str, source_url: &str) -> Result<RecipePayload, String> {
    let body = strip_code_fence(reply);
    let mut recipe: Value =
        serde_json::from_str(body).map_err(|e| format!("reply is not JSON: {}", e))?;

    let object = recipe
        .as_object_mut()
        .ok_or_else(|| "reply is not a JSON object".to_string())?;

    let has_name = object
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !has_name {
        return Err("recipe has no name".to_string());
    }

    object
        .entry("@type")
        .or_insert_with(|| Value::String("Recipe".to_string()));
    object
        .entry("url")
        .or_insert_with(|| Value::String(source_url.to_string()));
    Ok(recipe)
}

fn is_missing(recipe: &RecipePayload, key: &str) -> bool {
    recipe.get(key).is_none_or(Value::is_null)
}

/// Whether the recipe lacks (yield, nutrition).
fn missing_estimates(recipe: &RecipePayload) -> (bool, bool) {
    (is_missing(recipe, "recipeYield"), is_missing(recipe, "nutrition"))
}

/// User message of the estimate call: ingredient lines and step texts.
fn estimate_request(recipe: &RecipePayload, language: &str) -> String {
    let ingredients: Vec<&str> = recipe
        .get("recipeIngredient")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let instructions: Vec<String> = recipe
        .get("recipeInstructions")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .map(|step| match step {
                    Value::String(text) => text.clone(),
                    other => other
                        .get("text")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    serde_json::json!({
        "language_hint": language,
        "ingredients": ingredients,
        "instructions": instructions,
    })
    .to_string()
}

/// Non-empty text of a scalar estimate value.
fn estimate_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy a yield and nutrition estimate into the fields the recipe lacks.
pub fn apply_estimate(recipe: &mut RecipePayload, reply: &str) -> Result<(), String> {
    let estimate: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| format!("estimate is not JSON: {}", e))?;
    let (need_yield, need_nutrition) = missing_estimates(recipe);
    let object = recipe
        .as_object_mut()
        .ok_or_else(|| "recipe is not a JSON object".to_string())?;

    if need_yield {
        let recipe_yield = estimate.get("recipeYield").and_then(estimate_text).or_else(|| {
            estimate
                .get("servings")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .map(|n| format!("{} servings", n))
        });
        if let Some(recipe_yield) = recipe_yield {
            object.insert("recipeYield".to_string(), Value::String(recipe_yield));
        }
    }

    if need_nutrition {
        if let Some(estimated) = estimate.get("nutrition").and_then(Value::as_object) {
            let mut nutrition = serde_json::Map::new();
            for field in NUTRITION_FIELDS {
                if let Some(text) = estimated.get(field).and_then(estimate_text) {
                    nutrition.insert(field.to_string(), Value::String(text));
                }
            }
            if !nutrition.is_empty() {
                nutrition.insert(
                    "@type".to_string(),
                    Value::String("NutritionInformation".to_string()),
                );
                object.insert("nutrition".to_string(), Value::Object(nutrition));
            }
        }
    }
    Ok(())
}

/// Models sometimes wrap JSON in a markdown fence despite instructions.
pub(super) fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl RecipeGenerator for OpenAiRecipeGenerator {
    async fn generate(
        &self,
        source_url: &str,
        description: &str,
        transcript: &str,
    ) -> Result<RecipePayload, CollaboratorError> {
        let prompt = self.prompt(source_url, description, transcript);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let reply = self
                .complete(SYSTEM_PROMPT, &prompt)
                .await
                .map_err(CollaboratorError::Generation)?;

            match parse_recipe(&reply, source_url) {
                Ok(mut recipe) => {
                    debug!(attempt, "Recipe generated");
                    if self.config.enrich_nutrition {
                        self.enrich(&mut recipe).await;
                    }
                    return Ok(recipe);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Model returned an unusable recipe");
                    last_error = e;
                }
            }
        }

        Err(CollaboratorError::Generation(format!(
            "no valid recipe after {} attempts: {}",
            attempts, last_error
        )))
    }
}
