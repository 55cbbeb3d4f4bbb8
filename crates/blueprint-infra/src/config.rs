//! Configuration loader for the blueprint store.
//!
//! Reads `config.toml` from the data directory (`~/.blueprints/` unless
//! `BLUEPRINT_DATA_DIR` says otherwise) and deserializes it into
//! [`BlueprintConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use blueprint_types::config::BlueprintConfig;

/// Environment variable selecting the data directory.
pub const DATA_DIR_ENV: &str = "BLUEPRINT_DATA_DIR";

/// Environment variable overriding `database.url`.
pub const DATABASE_URL_ENV: &str = "BLUEPRINT_DATABASE_URL";

/// Resolve the data directory: `$BLUEPRINT_DATA_DIR`, else `~/.blueprints`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blueprints")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: logs a warning and returns defaults.
/// - `BLUEPRINT_DATABASE_URL`, when set, overrides `database.url`.
/// - An empty `database.url` resolves to `sqlite://{data_dir}/blueprints.db`.
pub async fn load_config(data_dir: &Path) -> BlueprintConfig {
    let database_url_override = std::env::var(DATABASE_URL_ENV).ok().filter(|u| !u.is_empty());
    load_config_with(data_dir, database_url_override).await
}

async fn load_config_with(data_dir: &Path, database_url_override: Option<String>) -> BlueprintConfig {
    let mut config = read_config_file(data_dir).await;

    if let Some(url) = database_url_override {
        config.database.url = url;
    }
    if config.database.url.is_empty() {
        config.database.url = format!("sqlite://{}", data_dir.join("blueprints.db").display());
    }

    if !config.embedding.providers.contains_key(&config.embedding.default_provider) {
        tracing::warn!(
            provider = %config.embedding.default_provider,
            "Default embedding provider has no settings; embedding calls will fall through to the fallback chain"
        );
    }

    config
}

async fn read_config_file(data_dir: &Path) -> BlueprintConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return BlueprintConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return BlueprintConfig::default();
        }
    };

    match toml::from_str::<BlueprintConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            BlueprintConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::config::ProviderKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults_with_derived_url() {
        let tmp = TempDir::new().unwrap();
        let config = load_config_with(tmp.path(), None).await;

        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.embedding.default_provider, "local");
        assert!(config.database.url.starts_with("sqlite://"));
        assert!(config.database.url.ends_with("blueprints.db"));
        assert!(config.database.url.contains(&tmp.path().display().to_string()));
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[database]
url = "sqlite:///srv/bp.db"

[embedding]
dimensions = 1536
default_provider = "openai"
fallback_providers = ["local"]

[embedding.providers.openai]
kind = "openai_compatible"
model = "text-embedding-3-small"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
"#,
        )
        .await
        .unwrap();

        let config = load_config_with(tmp.path(), None).await;
        assert_eq!(config.database.url, "sqlite:///srv/bp.db");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.fallback_providers, vec!["local"]);
        assert_eq!(
            config.embedding.providers["openai"].kind,
            ProviderKind::OpenAiCompatible
        );
    }

    #[tokio::test]
    async fn malformed_toml_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not [valid toml")
            .await
            .unwrap();

        let config = load_config_with(tmp.path(), None).await;
        assert_eq!(config.embedding.dimensions, 768);
    }

    #[tokio::test]
    async fn database_url_override_wins() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[database]\nurl = \"sqlite:///a.db\"\n")
            .await
            .unwrap();

        let config = load_config_with(tmp.path(), Some("sqlite:///b.db".to_string())).await;
        assert_eq!(config.database.url, "sqlite:///b.db");
    }

    #[test]
    fn data_dir_ends_with_default_name_or_env() {
        let dir = data_dir();
        match std::env::var(DATA_DIR_ENV) {
            Ok(value) if !value.is_empty() => assert_eq!(dir, PathBuf::from(value)),
            _ => assert!(dir.ends_with(".blueprints")),
        }
    }
}
