use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bucketeer_core::Storage;
use bucketeer_core::backend::Backend;
use bucketeer_core::backend::local::LocalBackend;
use bucketeer_core::backend::s3::S3Backend;

const CONFIG_FILE: &str = "bucketeer.toml";

const ENV_CONTAINER: &str = "BUCKETEER_CONTAINER";
const ENV_ACCESS_KEY: &str = "BUCKETEER_ACCESS_KEY";
const ENV_SECRET_KEY: &str = "BUCKETEER_SECRET_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket used when a command does not pass `--bucket`.
    pub container: String,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    #[serde(rename = "local")]
    Local { path: String },
    #[serde(rename = "s3")]
    S3 {
        endpoint: String,
        region: String,
        access_key: String,
        secret_key: String,
        #[serde(default = "default_public_read")]
        public_read: bool,
    },
}

fn default_public_read() -> bool {
    true
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bucketeer")
            .join(CONFIG_FILE)
    }

    fn resolve(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path)
    }

    /// Load the config file and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve(path);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("config not found at {}", path.display()))?;
        let mut config: Self = toml::from_str(&content).context("failed to parse config")?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(path)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(container) = non_empty(ENV_CONTAINER) {
            self.storage.container = container;
        }
        if let BackendConfig::S3 {
            access_key,
            secret_key,
            ..
        } = &mut self.storage.backend
        {
            if let Some(value) = non_empty(ENV_ACCESS_KEY) {
                *access_key = value;
            }
            if let Some(value) = non_empty(ENV_SECRET_KEY) {
                *secret_key = value;
            }
        }
    }

    pub fn open_backend(&self) -> Result<Arc<dyn Backend>> {
        match &self.storage.backend {
            BackendConfig::Local { path } => Ok(Arc::new(LocalBackend::new(path)?)),
            BackendConfig::S3 {
                endpoint,
                region,
                access_key,
                secret_key,
                public_read,
            } => {
                let backend = S3Backend::new(endpoint, region, access_key, secret_key)?
                    .with_public_read(*public_read);
                Ok(Arc::new(backend))
            }
        }
    }

    pub fn open_storage(&self) -> Result<Storage> {
        if self.storage.container.is_empty() {
            anyhow::bail!("no container configured (set storage.container or {ENV_CONTAINER})");
        }
        Ok(Storage::new(
            self.open_backend()?,
            self.storage.container.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const S3_CONFIG: &str = r#"
[storage]
container = "assets"

[storage.backend]
type = "s3"
endpoint = "https://s3.eu-central-1.amazonaws.com"
region = "eu-central-1"
access_key = "AKIAFILE"
secret_key = "file-secret"
"#;

    #[test]
    fn parses_s3_config_with_public_read_default() {
        let config: AppConfig = toml::from_str(S3_CONFIG).unwrap();
        assert_eq!(config.storage.container, "assets");
        match config.storage.backend {
            BackendConfig::S3 {
                region,
                public_read,
                ..
            } => {
                assert_eq!(region, "eu-central-1");
                assert!(public_read);
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn environment_overrides_container_and_credentials() {
        let mut config: AppConfig = toml::from_str(S3_CONFIG).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_CONTAINER, "override"),
            (ENV_ACCESS_KEY, "AKIAENV"),
            (ENV_SECRET_KEY, ""),
        ]);
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.container, "override");
        let BackendConfig::S3 {
            access_key,
            secret_key,
            ..
        } = &config.storage.backend
        else {
            panic!("expected s3 backend");
        };
        assert_eq!(access_key, "AKIAENV");
        assert_eq!(secret_key, "file-secret");
    }

    #[test]
    fn save_then_load_local_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = AppConfig {
            storage: StorageConfig {
                container: "main".to_string(),
                backend: BackendConfig::Local {
                    path: dir.path().display().to_string(),
                },
            },
        };
        config.save(Some(&path)).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert!(matches!(loaded.storage.backend, BackendConfig::Local { .. }));
        assert!(loaded.open_storage().is_ok());
    }
}
