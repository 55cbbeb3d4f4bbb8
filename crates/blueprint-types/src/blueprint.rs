use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::category::Category;

/// Unique identifier for a blueprint, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlueprintId(pub Uuid);

impl BlueprintId {
    /// Create a new BlueprintId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a BlueprintId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for BlueprintId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlueprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlueprintId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A stored code snippet with metadata and an embedding vector.
///
/// `code` is always present and non-empty. The embedding, when set, has the
/// dimension configured for the whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub name: String,
    pub description: String,
    pub code: String,
    /// Source language of the snippet (e.g. "ruby").
    pub language: Option<String>,
    /// File-type tag (e.g. "rb", "erb").
    pub file_type: Option<String>,
    /// Blueprint-type tag (e.g. "code", "template").
    pub blueprint_type: Option<String>,
    /// Parser-type tag used by downstream tooling.
    pub parser_type: Option<String>,
    /// Semantic embedding of name + description. Not serialized.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// User-managed freeform tags.
    pub tags: Vec<String>,
    /// Structured key/value metadata (always a JSON object).
    pub metadata: serde_json::Value,
    /// Associated categories, resolved on read.
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Blueprint {
    /// Category titles in stored order.
    pub fn category_titles(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.title.as_str()).collect()
    }
}

/// Request to create a new blueprint.
///
/// Name, description and categories are usually produced by a submission
/// workflow before the store is called; the store never generates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBlueprintRequest {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub file_type: Option<String>,
    pub blueprint_type: Option<String>,
    pub parser_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CreateBlueprintRequest {
    /// Start a request for the given code snippet.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_categories<S: Into<String>>(mut self, categories: impl IntoIterator<Item = S>) -> Self {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Partial update of a blueprint.
///
/// `None` fields are left untouched. `categories: Some(vec![])` clears all
/// associations; `categories: None` leaves them as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBlueprintRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
}

impl UpdateBlueprintRequest {
    /// Whether the update touches the text the embedding is derived from.
    pub fn changes_embedding_text(&self) -> bool {
        self.name.is_some() || self.description.is_some()
    }

    /// Whether the update carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.categories.is_none()
    }
}

/// Field changes handed to the repository for a single atomic update.
#[derive(Debug, Clone, Default)]
pub struct BlueprintChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replacement embedding; `None` keeps the stored one.
    pub embedding: Option<Vec<f32>>,
    /// Replacement category set; `None` keeps existing associations.
    pub categories: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
    /// Apply only if the stored `updated_at` still equals this value.
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// A blueprint returned from vector search with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub blueprint: Blueprint,
    /// Cosine distance to the query embedding (lower is closer).
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blueprint_id_roundtrip() {
        let id = BlueprintId::new();
        let parsed: BlueprintId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_update_request_embedding_trigger() {
        let code_only = UpdateBlueprintRequest {
            code: Some("puts 2".to_string()),
            ..Default::default()
        };
        assert!(!code_only.changes_embedding_text());

        let renamed = UpdateBlueprintRequest {
            name: Some("B".to_string()),
            ..Default::default()
        };
        assert!(renamed.changes_embedding_text());
    }

    #[test]
    fn test_update_request_empty_categories_is_not_empty() {
        let clear = UpdateBlueprintRequest {
            categories: Some(vec![]),
            ..Default::default()
        };
        assert!(!clear.is_empty());
        assert!(UpdateBlueprintRequest::default().is_empty());
    }

    #[test]
    fn test_create_request_builder() {
        let request = CreateBlueprintRequest::new("puts 1")
            .with_name("A")
            .with_description("adds")
            .with_categories(["Ruby"])
            .with_language("ruby");
        assert_eq!(request.code, "puts 1");
        assert_eq!(request.categories, vec!["Ruby"]);
        assert_eq!(request.language.as_deref(), Some("ruby"));
        assert!(request.metadata.is_none());
    }

    #[test]
    fn test_embedding_not_serialized() {
        let now = Utc::now();
        let blueprint = Blueprint {
            id: BlueprintId::new(),
            name: "A".to_string(),
            description: "adds".to_string(),
            code: "puts 1".to_string(),
            language: None,
            file_type: None,
            blueprint_type: None,
            parser_type: None,
            embedding: Some(vec![0.5; 4]),
            tags: vec![],
            metadata: serde_json::json!({}),
            categories: vec![],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&blueprint).unwrap();
        assert!(!json.contains("embedding"));
    }
}
