//! Blueprint repository trait definition.

use blueprint_types::blueprint::{Blueprint, BlueprintChanges, BlueprintId, SearchHit};
use blueprint_types::category::Category;
use blueprint_types::error::RepositoryError;

/// Repository trait for blueprint and category persistence.
///
/// Implementations live in blueprint-infra (e.g., SqliteBlueprintRepository).
/// Every mutating method is a single transaction: either all of its writes
/// land or none do.
pub trait BlueprintRepository: Send + Sync {
    /// Insert a blueprint and associate it with the given category titles,
    /// creating categories that do not exist yet. Returns the stored
    /// blueprint with its categories resolved.
    fn create(
        &self,
        blueprint: &Blueprint,
        category_titles: &[String],
    ) -> impl std::future::Future<Output = Result<Blueprint, RepositoryError>> + Send;

    /// Get a blueprint (with categories) by ID.
    fn get(
        &self,
        id: &BlueprintId,
    ) -> impl std::future::Future<Output = Result<Option<Blueprint>, RepositoryError>> + Send;

    /// Page through blueprints, newest first.
    fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Blueprint>, RepositoryError>> + Send;

    /// Apply field changes and, when `changes.categories` is set, replace the
    /// category associations. Returns `None` when the blueprint does not exist.
    fn update(
        &self,
        id: &BlueprintId,
        changes: &BlueprintChanges,
    ) -> impl std::future::Future<Output = Result<Option<Blueprint>, RepositoryError>> + Send;

    /// Delete a blueprint and its associations. Returns whether a row existed.
    /// Categories themselves are never deleted.
    fn delete(
        &self,
        id: &BlueprintId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Total number of stored blueprints.
    fn count(&self) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// Return the category with this exact title, creating it if absent.
    /// Safe under concurrent callers: exactly one row per title results.
    fn find_or_create_category(
        &self,
        title: &str,
    ) -> impl std::future::Future<Output = Result<Category, RepositoryError>> + Send;

    fn get_category_by_title(
        &self,
        title: &str,
    ) -> impl std::future::Future<Output = Result<Option<Category>, RepositoryError>> + Send;

    /// All categories, ordered by title.
    fn list_categories(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Category>, RepositoryError>> + Send;

    /// Nearest blueprints to `query` by cosine distance, closest first.
    ///
    /// Blueprints without a usable embedding (missing, wrong dimension, or
    /// the zero vector) are never returned.
    fn search(
        &self,
        query: &[f32],
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<SearchHit>, RepositoryError>> + Send;
}
