//! HTTP plumbing and schema.org helpers shared by the recipe manager exporters.

use std::path::Path;
use std::time::Duration;

use reqwest::{multipart, Client, Method};
use serde_json::Value;

use crate::config::RecipeManagerConfig;

/// Longest response excerpt carried into an error message.
const BODY_EXCERPT_CHARS: usize = 500;

/// Bearer-authenticated JSON client for one recipe manager.
pub(crate) struct RecipeApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RecipeApiClient {
    pub fn new(config: &RecipeManagerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a JSON body and parse the JSON reply (`Null` for an empty body).
    pub async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value, String> {
        let response = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{} {} failed: {}", method, path, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!(
                "{} {} returned {}: {}",
                method,
                path,
                status.as_u16(),
                excerpt(&text)
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| format!("{} {} returned invalid JSON: {}", method, path, e))
    }

    /// Upload an image file as multipart field `image`, plus any extra text fields.
    pub async fn upload_image(
        &self,
        method: Method,
        path: &str,
        image: &Path,
        extra_fields: &[(&'static str, String)],
    ) -> Result<(), String> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| format!("cannot read image {}: {}", image.display(), e))?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(image_content_type(image))
            .map_err(|e| e.to_string())?;
        let mut form = multipart::Form::new().part("image", part);
        for (name, value) in extra_fields {
            form = form.text(*name, value.clone());
        }

        let response = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("{} {} failed: {}", method, path, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!(
                "{} {} returned {}: {}",
                method,
                path,
                status.as_u16(),
                excerpt(&text)
            ));
        }
        Ok(())
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}

pub(crate) fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// A string field, empty when missing.
pub(crate) fn text_field(recipe: &Value, key: &str) -> String {
    recipe
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Flatten a schema.org list field into plain strings.
///
/// Handles a single string, arrays of strings, `HowToStep` objects and
/// `HowToSection` objects with nested `itemListElement`.
pub(crate) fn text_list(value: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(value) = value {
        collect_text(value, &mut out);
    }
    out
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        Value::Object(map) => {
            if let Some(nested) = map.get("itemListElement") {
                collect_text(nested, out);
            } else if let Some(text) = map.get("text").or_else(|| map.get("name")) {
                collect_text(text, out);
            }
        }
        _ => {}
    }
}

/// Keywords from either a comma-separated string or an array.
pub(crate) fn keywords(recipe: &Value) -> Vec<String> {
    match recipe.get("keywords") {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        other => text_list(other),
    }
}

/// Minutes in an ISO 8601 duration such as `PT1H30M`.
pub(crate) fn iso_duration_minutes(recipe: &Value, key: &str) -> Option<u64> {
    let raw = recipe.get(key)?.as_str()?.trim().to_ascii_uppercase();
    let time = raw.strip_prefix("PT")?;

    let mut minutes = 0u64;
    let mut number = String::new();
    for c in time.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: u64 = number.parse().ok()?;
        number.clear();
        match c {
            'H' => minutes += n * 60,
            'M' => minutes += n,
            'S' => minutes += n / 60,
            _ => return None,
        }
    }
    Some(minutes)
}

/// Leading integer of `recipeYield` ("4 servings" -> 4).
pub(crate) fn servings(recipe: &Value) -> Option<u64> {
    match recipe.get("recipeYield")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|part| part.parse().ok()),
        Value::Array(items) => items.first().and_then(|first| servings(&serde_json::json!({ "recipeYield": first }))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_list_flattens_steps_and_sections() {
        let instructions = json!([
            {"@type": "HowToStep", "text": "Chop onions"},
            {"@type": "HowToSection", "name": "Sauce", "itemListElement": [
                {"@type": "HowToStep", "text": "Add tomatoes"}
            ]},
            "Serve hot"
        ]);
        assert_eq!(
            text_list(Some(&instructions)),
            vec!["Chop onions", "Add tomatoes", "Serve hot"]
        );
        assert!(text_list(None).is_empty());
    }

    #[test]
    fn test_iso_duration_minutes() {
        let recipe = json!({"prepTime": "PT1H30M", "cookTime": "PT45M", "totalTime": "P1D"});
        assert_eq!(iso_duration_minutes(&recipe, "prepTime"), Some(90));
        assert_eq!(iso_duration_minutes(&recipe, "cookTime"), Some(45));
        assert_eq!(iso_duration_minutes(&recipe, "totalTime"), None);
        assert_eq!(iso_duration_minutes(&recipe, "missing"), None);
    }

    #[test]
    fn test_servings() {
        assert_eq!(servings(&json!({"recipeYield": "4 servings"})), Some(4));
        assert_eq!(servings(&json!({"recipeYield": 6})), Some(6));
        assert_eq!(servings(&json!({"recipeYield": ["2", "2 plates"]})), Some(2));
        assert_eq!(servings(&json!({"recipeYield": "some"})), None);
    }

    #[test]
    fn test_keywords_from_string_or_array() {
        assert_eq!(keywords(&json!({"keywords": "vegan, quick"})), vec!["vegan", "quick"]);
        assert_eq!(keywords(&json!({"keywords": ["soup"]})), vec!["soup"]);
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(image_content_type(Path::new("a.PNG")), "image/png");
        assert_eq!(image_content_type(Path::new("a.jpg")), "image/jpeg");
    }
}
