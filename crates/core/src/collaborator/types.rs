//! Types exchanged with external collaborators.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Recipe payload produced by the generator (schema.org Recipe JSON).
pub type RecipePayload = serde_json::Value;

/// Video fetched from a social platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Platform media identifier, used to key caches.
    pub media_id: String,
    /// Local path of the downloaded video.
    pub path: PathBuf,
    pub title: String,
    pub description: String,
}

/// Candidate dish images extracted from a video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCandidates {
    pub paths: Vec<PathBuf>,
    /// Index into `paths` of the automatically selected image.
    pub best_index: usize,
}

impl ImageCandidates {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The automatically selected image, if any.
    pub fn best(&self) -> Option<&PathBuf> {
        self.paths.get(self.best_index)
    }
}

/// Recipe manager a recipe can be uploaded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTarget {
    Tandoor,
    Mealie,
}

impl ExportTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportTarget::Tandoor => "tandoor",
            ExportTarget::Mealie => "mealie",
        }
    }
}

impl fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tandoor" => Ok(ExportTarget::Tandoor),
            "mealie" => Ok(ExportTarget::Mealie),
            other => Err(format!("unknown export target: {}", other)),
        }
    }
}
