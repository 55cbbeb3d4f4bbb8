use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for a category, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub Uuid);

impl CategoryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CategoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CategoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A reusable label attachable to many blueprints.
///
/// Titles are unique and case-sensitive ("Ruby" and "ruby" are distinct).
/// Categories are created lazily on first use and outlive the blueprints
/// that reference them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub description: Option<String>,
    /// Display color hint (e.g. "#ff8800"), free-form.
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a list of requested category titles.
///
/// Titles are trimmed, blank entries dropped, and exact duplicates collapsed
/// while preserving first-seen order.
pub fn normalize_titles<S: AsRef<str>>(titles: &[S]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(titles.len());
    for title in titles {
        let title = title.as_ref().trim();
        if title.is_empty() || seen.iter().any(|s| s == title) {
            continue;
        }
        seen.push(title.to_string());
    }
    seen
}
