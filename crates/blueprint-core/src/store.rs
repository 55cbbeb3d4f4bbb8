//! Blueprint store: transactional CRUD and semantic search.
//!
//! `BlueprintStore` combines a `BlueprintRepository` (rows, categories,
//! associations, vector distance) with the shared `EmbeddingService`.
//! Embedding failures never abort a write: `create_blueprint` stores the
//! zero vector, `update_blueprint` keeps the previous embedding, and
//! `search_blueprints` returns no results.

use std::sync::Arc;

use chrono::Utc;

use blueprint_types::blueprint::{
    Blueprint, BlueprintChanges, BlueprintId, CreateBlueprintRequest, SearchHit,
    UpdateBlueprintRequest,
};
use blueprint_types::category::{Category, normalize_titles};
use blueprint_types::embedding::EmbedOptions;
use blueprint_types::error::{RepositoryError, StoreError};

use crate::embedding::{EmbeddingService, ProviderFactory};
use crate::repository::BlueprintRepository;

/// Reads of a blueprint per `update_blueprint` call when concurrent writers
/// keep invalidating the regenerated embedding.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Text a blueprint's embedding is derived from.
pub fn embedding_text(name: &str, description: &str) -> String {
    let name = name.trim();
    let description = description.trim();
    match (name.is_empty(), description.is_empty()) {
        (false, false) => format!("{name}\n{description}"),
        (false, true) => name.to_string(),
        (true, false) => description.to_string(),
        (true, true) => String::new(),
    }
}

/// Public entry point for blueprint persistence.
///
/// Generic over the repository and the provider factory so blueprint-core
/// never depends on blueprint-infra.
pub struct BlueprintStore<R: BlueprintRepository, F: ProviderFactory> {
    repo: R,
    embeddings: Arc<EmbeddingService<F>>,
}

impl<R: BlueprintRepository, F: ProviderFactory> BlueprintStore<R, F> {
    pub fn new(repo: R, embeddings: Arc<EmbeddingService<F>>) -> Self {
        Self { repo, embeddings }
    }

    pub fn embedding_service(&self) -> &Arc<EmbeddingService<F>> {
        &self.embeddings
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Embed `text` for storage, or `None` if no usable vector came back.
    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        let expected = self.embeddings.dimensions();
        match self.embeddings.embed(text, &EmbedOptions::default()).await {
            Ok(vector) if vector.len() == expected => Some(vector),
            Ok(vector) => {
                tracing::warn!(
                    expected,
                    actual = vector.len(),
                    "Embedding dimension does not match the blueprint table"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Embedding generation failed");
                None
            }
        }
    }

    /// Create a blueprint with its embedding and category associations.
    ///
    /// The row, any new categories and all associations are written in one
    /// transaction. When no embedding can be produced the zero vector of
    /// the configured dimension is stored instead.
    pub async fn create_blueprint(&self, request: CreateBlueprintRequest) -> Result<Blueprint, StoreError> {
        if request.code.is_empty() {
            return Err(StoreError::InvalidInput("code cannot be empty".to_string()));
        }

        let metadata = match request.metadata {
            None => serde_json::Value::Object(serde_json::Map::new()),
            Some(value @ serde_json::Value::Object(_)) => value,
            Some(_) => {
                return Err(StoreError::InvalidInput(
                    "metadata must be a JSON object".to_string(),
                ));
            }
        };

        let text = embedding_text(&request.name, &request.description);
        let embedding = match self.try_embed(&text).await {
            Some(vector) => vector,
            None => {
                tracing::warn!(name = %request.name, "Storing blueprint with zero-vector embedding");
                self.embeddings.zero_vector()
            }
        };

        let now = Utc::now();
        let blueprint = Blueprint {
            id: BlueprintId::new(),
            name: request.name,
            description: request.description,
            code: request.code,
            language: request.language,
            file_type: request.file_type,
            blueprint_type: request.blueprint_type,
            parser_type: request.parser_type,
            embedding: Some(embedding),
            tags: request.tags,
            metadata,
            categories: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let titles = normalize_titles(&request.categories);

        let created = self.repo.create(&blueprint, &titles).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to create blueprint");
            StoreError::from(e)
        })?;

        tracing::info!(
            blueprint_id = %created.id,
            categories = created.categories.len(),
            "Created blueprint"
        );
        Ok(created)
    }

    /// Fetch one blueprint with its categories. `Ok(None)` when absent.
    pub async fn get_blueprint(&self, id: &BlueprintId) -> Result<Option<Blueprint>, StoreError> {
        self.repo.get(id).await.map_err(|e| {
            tracing::error!(blueprint_id = %id, error = %e, "Failed to fetch blueprint");
            StoreError::from(e)
        })
    }

    /// Page through blueprints, newest first.
    pub async fn list_blueprints(&self, limit: i64, offset: i64) -> Result<Vec<Blueprint>, StoreError> {
        if limit < 0 || offset < 0 {
            return Err(StoreError::InvalidInput(
                "limit and offset must be non-negative".to_string(),
            ));
        }
        self.repo.list(limit, offset).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list blueprints");
            StoreError::from(e)
        })
    }

    /// Partially update a blueprint.
    ///
    /// The embedding is regenerated only when `name` or `description` is
    /// supplied; if regeneration fails the stored embedding is kept.
    /// `categories: Some(..)` replaces the whole association set (an empty
    /// list clears it). Returns `Ok(None)` when the blueprint does not exist.
    ///
    /// A regenerated embedding is written only if the row is unchanged since
    /// it was read; otherwise the read and the embedding are redone, up to
    /// `MAX_UPDATE_ATTEMPTS` times.
    pub async fn update_blueprint(
        &self,
        id: &BlueprintId,
        request: UpdateBlueprintRequest,
    ) -> Result<Option<Blueprint>, StoreError> {
        if request.code.as_deref().is_some_and(str::is_empty) {
            return Err(StoreError::InvalidInput("code cannot be empty".to_string()));
        }
        let categories = request.categories.as_deref().map(normalize_titles);

        let mut attempt = 1;
        loop {
            let Some(existing) = self.get_blueprint(id).await? else {
                return Ok(None);
            };
            if request.is_empty() {
                return Ok(Some(existing));
            }

            let embedding = if request.changes_embedding_text() {
                let name = request.name.as_deref().unwrap_or(&existing.name);
                let description = request.description.as_deref().unwrap_or(&existing.description);
                let vector = self.try_embed(&embedding_text(name, description)).await;
                if vector.is_none() {
                    tracing::warn!(blueprint_id = %id, "Keeping previous embedding after failed regeneration");
                }
                vector
            } else {
                None
            };

            let changes = BlueprintChanges {
                code: request.code.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
                expected_updated_at: embedding.as_ref().map(|_| existing.updated_at),
                embedding,
                categories: categories.clone(),
                updated_at: Utc::now(),
            };

            match self.repo.update(id, &changes).await {
                Ok(updated) => {
                    if updated.is_some() {
                        tracing::info!(blueprint_id = %id, "Updated blueprint");
                    }
                    return Ok(updated);
                }
                Err(RepositoryError::Stale(reason)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    tracing::debug!(blueprint_id = %id, attempt, %reason, "Blueprint changed during update, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(blueprint_id = %id, error = %e, "Failed to update blueprint");
                    return Err(StoreError::from(e));
                }
            }
        }
    }

    /// Delete a blueprint and its associations. Returns whether a row was removed.
    pub async fn delete_blueprint(&self, id: &BlueprintId) -> Result<bool, StoreError> {
        let deleted = self.repo.delete(id).await.map_err(|e| {
            tracing::error!(blueprint_id = %id, error = %e, "Failed to delete blueprint");
            StoreError::from(e)
        })?;
        if deleted {
            tracing::info!(blueprint_id = %id, "Deleted blueprint");
        }
        Ok(deleted)
    }

    /// Semantic search: the `limit` blueprints closest to `query`.
    ///
    /// Results are ordered by ascending cosine distance. An embedding
    /// failure yields an empty result rather than an error.
    pub async fn search_blueprints(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, StoreError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let Some(vector) = self.try_embed(query).await else {
            tracing::warn!("Search skipped: no query embedding");
            return Ok(Vec::new());
        };

        let hits = self.repo.search(&vector, limit).await.map_err(|e| {
            tracing::error!(error = %e, "Vector search failed");
            StoreError::from(e)
        })?;
        tracing::debug!(results = hits.len(), limit, "Vector search complete");
        Ok(hits)
    }

    /// Return the category with this title, creating it if needed.
    pub async fn find_or_create_category(&self, title: &str) -> Result<Category, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("category title cannot be empty".to_string()));
        }
        self.repo.find_or_create_category(title).await.map_err(|e| {
            tracing::error!(title, error = %e, "Failed to find or create category");
            StoreError::from(e)
        })
    }

    pub async fn get_category_by_title(&self, title: &str) -> Result<Option<Category>, StoreError> {
        let title = title.trim();
        self.repo.get_category_by_title(title).await.map_err(|e| {
            tracing::error!(title, error = %e, "Failed to fetch category");
            StoreError::from(e)
        })
    }

    /// All categories ordered by title.
    pub async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        self.repo.list_categories().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list categories");
            StoreError::from(e)
        })
    }

    pub async fn count_blueprints(&self) -> Result<i64, StoreError> {
        self.repo.count().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to count blueprints");
            StoreError::from(e)
        })
    }
}
