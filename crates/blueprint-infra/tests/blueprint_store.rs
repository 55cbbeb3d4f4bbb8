//! End-to-end tests: BlueprintStore over SQLite + sqlite-vec with scripted
//! embedding providers (no model download, no network).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use blueprint_core::embedding::{BoxEmbeddingProvider, EmbeddingProvider, EmbeddingService, ProviderFactory};
use blueprint_core::store::BlueprintStore;
use blueprint_core::vector::{is_zero_vector, similarity_percentage};
use blueprint_infra::sqlite::blueprint::SqliteBlueprintRepository;
use blueprint_infra::sqlite::pool::DatabasePool;
use blueprint_types::blueprint::{CreateBlueprintRequest, UpdateBlueprintRequest};
use blueprint_types::config::{EmbeddingConfig, ProviderSettings};
use blueprint_types::embedding::{EmbedOptions, Embedding};
use blueprint_types::error::{EmbeddingError, StoreError};

const DIMS: usize = 16;

/// Bag-of-words hashing embedder: texts sharing words land close together.
struct WordHashProvider {
    id: String,
    online: Arc<AtomicBool>,
}

impl EmbeddingProvider for WordHashProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        "word-hash"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ProviderUnavailable {
                provider: self.id.clone(),
                message: "offline".to_string(),
            });
        }
        let mut vector = vec![0.0_f32; DIMS];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % (DIMS - 1);
            vector[bucket] += 1.0;
        }
        // Words never land in the last bucket; it only keeps empty text off
        // the zero vector.
        vector[DIMS - 1] += 0.01;
        Ok(Embedding::new(vector))
    }
}

struct SwitchFactory {
    online: HashMap<String, Arc<AtomicBool>>,
}

impl ProviderFactory for SwitchFactory {
    async fn build(
        &self,
        id: &str,
        _settings: &ProviderSettings,
        _dimensions: usize,
    ) -> Result<BoxEmbeddingProvider, EmbeddingError> {
        let online = self
            .online
            .get(id)
            .cloned()
            .ok_or_else(|| EmbeddingError::UnknownProvider(id.to_string()))?;
        Ok(BoxEmbeddingProvider::new(WordHashProvider {
            id: id.to_string(),
            online,
        }))
    }
}

struct Fixture {
    store: BlueprintStore<SqliteBlueprintRepository, SwitchFactory>,
    primary: Arc<AtomicBool>,
    backup: Arc<AtomicBool>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn pool(&self) -> &DatabasePool {
        self.store.repository().pool()
    }

    fn set_online(&self, primary: bool, backup: bool) {
        self.primary.store(primary, Ordering::SeqCst);
        self.backup.store(backup, Ordering::SeqCst);
    }
}

async fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
    let pool = DatabasePool::open(&url).await.unwrap();

    let primary = Arc::new(AtomicBool::new(true));
    let backup = Arc::new(AtomicBool::new(true));
    let factory = SwitchFactory {
        online: HashMap::from([
            ("primary".to_string(), Arc::clone(&primary)),
            ("backup".to_string(), Arc::clone(&backup)),
        ]),
    };
    let config = EmbeddingConfig {
        dimensions: DIMS,
        default_provider: "primary".to_string(),
        fallback_providers: vec!["backup".to_string()],
        providers: BTreeMap::from([
            ("primary".to_string(), ProviderSettings::local_default()),
            ("backup".to_string(), ProviderSettings::local_default()),
        ]),
    };
    let service = Arc::new(EmbeddingService::new(config, factory));

    Fixture {
        store: BlueprintStore::new(SqliteBlueprintRepository::new(pool), service),
        primary,
        backup,
        _dir: dir,
    }
}

fn title_set(categories: &[blueprint_types::category::Category]) -> BTreeSet<String> {
    categories.iter().map(|c| c.title.clone()).collect()
}

fn set(titles: &[&str]) -> BTreeSet<String> {
    titles.iter().map(|t| t.to_string()).collect()
}

async fn association_count(pool: &DatabasePool, blueprint_id: &str) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM blueprint_categories WHERE blueprint_id = ?")
            .bind(blueprint_id)
            .fetch_one(&pool.reader)
            .await
            .unwrap();
    count
}

#[tokio::test]
async fn create_then_update_categories() {
    let f = fixture().await;

    let created = f
        .store
        .create_blueprint(
            CreateBlueprintRequest::new("puts 1")
                .with_name("A")
                .with_description("adds")
                .with_categories(["Ruby"]),
        )
        .await
        .unwrap();
    assert_eq!(created.category_titles(), vec!["Ruby"]);

    let fetched = f.store.get_blueprint(&created.id).await.unwrap().unwrap();
    assert_eq!(title_set(&fetched.categories), set(&["Ruby"]));

    f.store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                categories: Some(vec!["Ruby".to_string(), "Web".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    let fetched = f.store.get_blueprint(&created.id).await.unwrap().unwrap();
    assert_eq!(title_set(&fetched.categories), set(&["Ruby", "Web"]));
    assert_eq!(association_count(f.pool(), &created.id.to_string()).await, 2);
}

#[tokio::test]
async fn created_category_set_matches_request() {
    let f = fixture().await;
    let created = f
        .store
        .create_blueprint(
            CreateBlueprintRequest::new("SELECT 1")
                .with_name("inventory")
                .with_categories(["SQL", "Ops", "SQL", "  "]),
        )
        .await
        .unwrap();

    let fetched = f.store.get_blueprint(&created.id).await.unwrap().unwrap();
    assert_eq!(title_set(&fetched.categories), set(&["SQL", "Ops"]));
}

#[tokio::test]
async fn fallback_provider_serves_when_primary_fails() {
    let f = fixture().await;
    f.set_online(false, true);

    let service = f.store.embedding_service();
    let vector = service.embed("hello", &EmbedOptions::default()).await.unwrap();
    assert_eq!(vector.len(), DIMS);

    let stats = service.stats();
    assert_eq!(stats.provider_usage["primary"].failures, 1);
    assert_eq!(stats.provider_usage["backup"].successes, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
}

#[tokio::test]
async fn total_provider_outage_stores_zero_vector() {
    let f = fixture().await;
    f.set_online(false, false);

    let created = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_name("A").with_description("adds"))
        .await
        .unwrap();
    assert_eq!(created.embedding, Some(vec![0.0; DIMS]));

    let stored = f.store.get_blueprint(&created.id).await.unwrap().unwrap();
    assert!(is_zero_vector(stored.embedding.as_deref().unwrap()));
    assert_eq!(f.store.embedding_service().stats().failed_requests, 1);
}

#[tokio::test]
async fn create_is_atomic_when_association_fails() {
    let f = fixture().await;
    sqlx::query(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON blueprint_categories
         WHEN (SELECT title FROM categories WHERE id = NEW.category_id) = 'boom'
         BEGIN SELECT RAISE(ABORT, 'association rejected'); END",
    )
    .execute(&f.pool().writer)
    .await
    .unwrap();

    let result = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_categories(["Ruby", "boom"]))
        .await;

    assert!(matches!(result, Err(StoreError::Storage(_))), "got {result:?}");
    assert_eq!(f.store.count_blueprints().await.unwrap(), 0);
    assert!(f.store.list_categories().await.unwrap().is_empty());
}

#[tokio::test]
async fn code_only_update_keeps_embedding() {
    let f = fixture().await;
    let created = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_name("A").with_description("adds"))
        .await
        .unwrap();

    // A provider outage cannot matter: code-only edits never embed.
    f.set_online(false, false);
    let requests_before = f.store.embedding_service().stats().total_requests;

    let updated = f
        .store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                code: Some("puts 2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.code, "puts 2");
    assert_eq!(updated.embedding, created.embedding);
    assert_eq!(f.store.embedding_service().stats().total_requests, requests_before);
}

#[tokio::test]
async fn description_update_reembeds_and_failure_keeps_old() {
    let f = fixture().await;
    let created = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_name("A").with_description("adds"))
        .await
        .unwrap();

    let reembedded = f
        .store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                description: Some("parses json documents quickly".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_ne!(reembedded.embedding, created.embedding);

    f.set_online(false, false);
    let kept = f
        .store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                name: Some("B".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.name, "B");
    assert_eq!(kept.embedding, reembedded.embedding);
}

#[tokio::test]
async fn empty_category_list_clears_associations() {
    let f = fixture().await;
    let created = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_categories(["Ruby", "Web"]))
        .await
        .unwrap();

    let cleared = f
        .store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                categories: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(cleared.categories.is_empty());
    assert_eq!(association_count(f.pool(), &created.id.to_string()).await, 0);

    // No categories argument leaves associations untouched.
    f.store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                categories: Some(vec!["Ruby".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let untouched = f
        .store
        .update_blueprint(
            &created.id,
            UpdateBlueprintRequest {
                code: Some("puts 3".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.category_titles(), vec!["Ruby"]);
}

#[tokio::test]
async fn delete_removes_row_and_associations() {
    let f = fixture().await;
    let created = f
        .store
        .create_blueprint(CreateBlueprintRequest::new("puts 1").with_categories(["Ruby"]))
        .await
        .unwrap();

    assert!(f.store.delete_blueprint(&created.id).await.unwrap());
    assert!(f.store.get_blueprint(&created.id).await.unwrap().is_none());
    assert_eq!(association_count(f.pool(), &created.id.to_string()).await, 0);
    assert!(!f.store.delete_blueprint(&created.id).await.unwrap());

    // Categories persist independently of blueprints.
    assert!(f.store.get_category_by_title("Ruby").await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_find_or_create_yields_one_row() {
    let f = fixture().await;

    let (a, b) = tokio::join!(
        f.store.find_or_create_category("Ruby"),
        f.store.find_or_create_category("Ruby"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.id, b.id);

    let all = f.store.list_categories().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn search_is_bounded_ordered_and_skips_degraded_rows() {
    let f = fixture().await;
    for (name, description) in [
        ("json parser", "parse json strings"),
        ("csv reader", "read csv files"),
        ("http client", "send http requests"),
        ("json writer", "write json output"),
    ] {
        f.store
            .create_blueprint(
                CreateBlueprintRequest::new("code")
                    .with_name(name)
                    .with_description(description)
                    .with_categories(["Utils"]),
            )
            .await
            .unwrap();
    }

    f.set_online(false, false);
    f.store
        .create_blueprint(CreateBlueprintRequest::new("code").with_name("json degraded"))
        .await
        .unwrap();
    f.set_online(true, true);

    let hits = f.store.search_blueprints("json", 3).await.unwrap();
    assert!(hits.len() <= 3);
    assert!(!hits.is_empty());
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(hits.iter().all(|h| h.blueprint.name != "json degraded"));
    let top_two: BTreeSet<String> = hits[..2].iter().map(|h| h.blueprint.name.clone()).collect();
    assert_eq!(top_two, set(&["json parser", "json writer"]));
    assert_eq!(hits[0].blueprint.category_titles(), vec!["Utils"]);

    let pct = similarity_percentage(hits[0].distance);
    assert!((0.0..=100.0).contains(&pct));

    let all = f.store.search_blueprints("json", 100).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn search_returns_empty_when_embedding_fails() {
    let f = fixture().await;
    f.store
        .create_blueprint(CreateBlueprintRequest::new("code").with_name("json parser"))
        .await
        .unwrap();
    f.set_online(false, false);

    let hits = f.store.search_blueprints("json", 5).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn list_is_newest_first() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let created = f
            .store
            .create_blueprint(CreateBlueprintRequest::new("code").with_name(name))
            .await
            .unwrap();
        ids.push(created.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let page = f.store.list_blueprints(10, 0).await.unwrap();
    let listed: Vec<_> = page.iter().map(|b| b.id).collect();
    ids.reverse();
    assert_eq!(listed, ids);

    let second_page = f.store.list_blueprints(1, 1).await.unwrap();
    assert_eq!(second_page[0].name, "second");
    assert_eq!(f.store.count_blueprints().await.unwrap(), 3);
}

#[tokio::test]
async fn health_check_reports_each_provider() {
    let f = fixture().await;
    f.set_online(true, false);

    let reports = f.store.embedding_service().health_check().await;
    let by_id: HashMap<_, _> = reports.iter().map(|r| (r.provider.as_str(), r.healthy)).collect();
    assert_eq!(by_id.get("primary"), Some(&true));
    assert_eq!(by_id.get("backup"), Some(&false));
}

#[tokio::test]
async fn read_failures_surface_as_storage_errors() {
    let f = fixture().await;
    f.pool().reader.close().await;

    assert!(matches!(f.store.count_blueprints().await, Err(StoreError::Storage(_))));
    assert!(matches!(
        f.store.get_category_by_title("Ruby").await,
        Err(StoreError::Storage(_))
    ));
}
