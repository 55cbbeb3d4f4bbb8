//! SQLite blueprint repository implementation.
//!
//! Implements `BlueprintRepository` from `blueprint-core` using sqlx with split
//! read/write pools. Every mutating operation runs in a single writer
//! transaction and reads its own result back before committing, so the
//! returned value is exactly what was stored.

use blueprint_core::repository::BlueprintRepository;
use blueprint_core::vector::format_vector_literal;
use blueprint_types::blueprint::{Blueprint, BlueprintChanges, BlueprintId, SearchHit};
use blueprint_types::category::{Category, CategoryId};
use blueprint_types::error::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::vector::{blob_to_vec, vec_to_blob};

/// SQLite-backed implementation of `BlueprintRepository`.
pub struct SqliteBlueprintRepository {
    pool: DatabasePool,
}

impl SqliteBlueprintRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

/// Internal row type for mapping SQLite rows to domain Blueprint.
struct BlueprintRow {
    id: String,
    name: String,
    description: String,
    code: String,
    language: Option<String>,
    file_type: Option<String>,
    blueprint_type: Option<String>,
    parser_type: Option<String>,
    embedding: Option<Vec<u8>>,
    tags: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl BlueprintRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            code: row.try_get("code")?,
            language: row.try_get("language")?,
            file_type: row.try_get("file_type")?,
            blueprint_type: row.try_get("blueprint_type")?,
            parser_type: row.try_get("parser_type")?,
            embedding: row.try_get("embedding")?,
            tags: row.try_get("tags")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Convert to a domain blueprint; categories are attached by the caller.
    fn into_blueprint(self) -> Result<Blueprint, RepositoryError> {
        let id = self
            .id
            .parse::<BlueprintId>()
            .map_err(|e| RepositoryError::Query(format!("invalid blueprint id: {e}")))?;

        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| RepositoryError::Query(format!("invalid tags JSON: {e}")))?;

        let metadata: serde_json::Value = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid metadata JSON: {e}")))?;

        Ok(Blueprint {
            id,
            name: self.name,
            description: self.description,
            code: self.code,
            language: self.language,
            file_type: self.file_type,
            blueprint_type: self.blueprint_type,
            parser_type: self.parser_type,
            embedding: self.embedding.as_deref().map(blob_to_vec),
            tags,
            metadata,
            categories: Vec::new(),
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Result<Category, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;

    Ok(Category {
        id: id
            .parse::<CategoryId>()
            .map_err(|e| RepositoryError::Query(format!("invalid category id: {e}")))?,
        title: row.try_get("title").map_err(query_error)?,
        description: row.try_get("description").map_err(query_error)?,
        color: row.try_get("color").map_err(query_error)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps so `ORDER BY created_at` is chronological.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Map write failures, surfacing constraint violations as conflicts.
fn write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.message().contains("constraint failed") {
            return RepositoryError::Conflict(db_err.message().to_string());
        }
    }
    RepositoryError::Query(e.to_string())
}

/// Insert-or-return a category in one statement.
///
/// The no-op `DO UPDATE` makes `RETURNING` yield the existing row on a
/// title conflict, so concurrent callers converge on a single row.
async fn upsert_category(conn: &mut SqliteConnection, title: &str) -> Result<Category, RepositoryError> {
    let now = format_datetime(&Utc::now());
    let row = sqlx::query(
        "INSERT INTO categories (id, title, description, color, created_at, updated_at)
         VALUES (?, ?, NULL, NULL, ?, ?)
         ON CONFLICT(title) DO UPDATE SET title = excluded.title
         RETURNING id, title, description, color, created_at, updated_at",
    )
    .bind(CategoryId::new().to_string())
    .bind(title)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await
    .map_err(write_error)?;

    row_to_category(&row)
}

/// Find-or-create each title and link it to the blueprint; duplicate pairs are ignored.
async fn link_categories(
    conn: &mut SqliteConnection,
    id: &BlueprintId,
    titles: &[String],
) -> Result<(), RepositoryError> {
    for title in titles {
        let category = upsert_category(conn, title).await?;
        sqlx::query("INSERT OR IGNORE INTO blueprint_categories (blueprint_id, category_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(category.id.to_string())
            .execute(&mut *conn)
            .await
            .map_err(write_error)?;
    }
    Ok(())
}

async fn categories_for(conn: &mut SqliteConnection, id: &BlueprintId) -> Result<Vec<Category>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT c.* FROM categories c
         JOIN blueprint_categories bc ON bc.category_id = c.id
         WHERE bc.blueprint_id = ?
         ORDER BY c.title",
    )
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(query_error)?;

    rows.iter().map(row_to_category).collect()
}

async fn fetch_blueprint(conn: &mut SqliteConnection, id: &BlueprintId) -> Result<Option<Blueprint>, RepositoryError> {
    let row = sqlx::query("SELECT * FROM blueprints WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_error)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut blueprint = BlueprintRow::from_row(&row)
        .map_err(query_error)?
        .into_blueprint()?;
    blueprint.categories = categories_for(conn, &blueprint.id).await?;
    Ok(Some(blueprint))
}

impl BlueprintRepository for SqliteBlueprintRepository {
    async fn create(&self, blueprint: &Blueprint, category_titles: &[String]) -> Result<Blueprint, RepositoryError> {
        let tags_json =
            serde_json::to_string(&blueprint.tags).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let metadata_json = serde_json::to_string(&blueprint.metadata)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO blueprints (id, name, description, code, language, file_type, blueprint_type, parser_type, embedding, tags, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(blueprint.id.to_string())
        .bind(&blueprint.name)
        .bind(&blueprint.description)
        .bind(&blueprint.code)
        .bind(&blueprint.language)
        .bind(&blueprint.file_type)
        .bind(&blueprint.blueprint_type)
        .bind(&blueprint.parser_type)
        .bind(blueprint.embedding.as_deref().map(vec_to_blob))
        .bind(&tags_json)
        .bind(&metadata_json)
        .bind(format_datetime(&blueprint.created_at))
        .bind(format_datetime(&blueprint.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        link_categories(&mut tx, &blueprint.id, category_titles).await?;

        let stored = fetch_blueprint(&mut tx, &blueprint.id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // Dropping `tx` on any error above rolls everything back.
        tx.commit().await.map_err(query_error)?;

        Ok(stored)
    }

    async fn get(&self, id: &BlueprintId) -> Result<Option<Blueprint>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;
        fetch_blueprint(&mut conn, id).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Blueprint>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;

        let rows = sqlx::query("SELECT * FROM blueprints ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_error)?;

        let mut blueprints = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut blueprint = BlueprintRow::from_row(row)
                .map_err(query_error)?
                .into_blueprint()?;
            blueprint.categories = categories_for(&mut conn, &blueprint.id).await?;
            blueprints.push(blueprint);
        }
        Ok(blueprints)
    }

    async fn update(&self, id: &BlueprintId, changes: &BlueprintChanges) -> Result<Option<Blueprint>, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        let expected = changes.expected_updated_at.as_ref().map(format_datetime);

        let result = sqlx::query(
            "UPDATE blueprints SET
                code = COALESCE(?, code),
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                embedding = COALESCE(?, embedding),
                updated_at = ?
             WHERE id = ? AND (? IS NULL OR updated_at = ?)",
        )
        .bind(&changes.code)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.embedding.as_deref().map(vec_to_blob))
        .bind(format_datetime(&changes.updated_at))
        .bind(id.to_string())
        .bind(&expected)
        .bind(&expected)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            if expected.is_some() && fetch_blueprint(&mut tx, id).await?.is_some() {
                return Err(RepositoryError::Stale(format!(
                    "blueprint {id} changed since it was read"
                )));
            }
            return Ok(None);
        }

        if let Some(titles) = &changes.categories {
            sqlx::query("DELETE FROM blueprint_categories WHERE blueprint_id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(write_error)?;
            link_categories(&mut tx, id, titles).await?;
        }

        let stored = fetch_blueprint(&mut tx, id).await?;
        tx.commit().await.map_err(query_error)?;

        Ok(stored)
    }

    async fn delete(&self, id: &BlueprintId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query("DELETE FROM blueprint_categories WHERE blueprint_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        let result = sqlx::query("DELETE FROM blueprints WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        tx.commit().await.map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blueprints")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;
        Ok(count)
    }

    async fn find_or_create_category(&self, title: &str) -> Result<Category, RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        upsert_category(&mut conn, title).await
    }

    async fn get_category_by_title(&self, title: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM categories WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_category).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM categories ORDER BY title")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(row_to_category).collect()
    }

    async fn search(&self, query: &[f32], limit: i64) -> Result<Vec<SearchHit>, RepositoryError> {
        let literal = format_vector_literal(query);
        let blob_len = (query.len() * std::mem::size_of::<f32>()) as i64;

        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;

        // The CASE keeps vec_distance_cosine away from rows of another
        // dimension. A zero vector has no direction; its cosine distance is
        // NaN, which SQLite stores as NULL, so degraded rows never rank.
        let rows = sqlx::query(
            "SELECT * FROM (
                 SELECT b.*,
                        CASE WHEN length(b.embedding) = ?
                             THEN vec_distance_cosine(b.embedding, vec_f32(?))
                        END AS distance
                 FROM blueprints b
                 WHERE b.embedding IS NOT NULL
             )
             WHERE distance IS NOT NULL
             ORDER BY distance ASC, id ASC
             LIMIT ?",
        )
        .bind(blob_len)
        .bind(&literal)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(query_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let distance: f64 = row.try_get("distance").map_err(query_error)?;
            let mut blueprint = BlueprintRow::from_row(row)
                .map_err(query_error)?
                .into_blueprint()?;
            // One category lookup per hit; result sets are small.
            blueprint.categories = categories_for(&mut conn, &blueprint.id).await?;
            hits.push(SearchHit { blueprint, distance });
        }
        Ok(hits)
    }
}
