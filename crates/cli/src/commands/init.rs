use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config::{AppConfig, BackendConfig, StorageConfig};

#[derive(Args)]
pub struct InitArgs {
    /// Backend type: local or s3
    #[arg(long)]
    backend: String,

    /// Default bucket (container) name
    #[arg(long)]
    container: String,

    /// Root directory for local backend
    #[arg(long)]
    path: Option<String>,

    /// S3 endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// S3 region
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// S3 access key
    #[arg(long)]
    access_key: Option<String>,

    /// S3 secret key
    #[arg(long)]
    secret_key: Option<String>,

    /// Upload objects without a public-read ACL
    #[arg(long)]
    private: bool,
}

pub async fn run(args: InitArgs, config_path: Option<&Path>) -> Result<()> {
    let backend = match args.backend.as_str() {
        "local" => {
            let path = args
                .path
                .ok_or_else(|| anyhow::anyhow!("--path required for local backend"))?;
            let root = Path::new(&path).join(&args.container);
            std::fs::create_dir_all(&root)
                .with_context(|| format!("failed to create directory: {}", root.display()))?;
            BackendConfig::Local { path }
        }
        "s3" => {
            let endpoint = args
                .endpoint
                .ok_or_else(|| anyhow::anyhow!("--endpoint required for S3 backend"))?;
            let access_key = args
                .access_key
                .ok_or_else(|| anyhow::anyhow!("--access-key required for S3 backend"))?;
            let secret_key = args
                .secret_key
                .ok_or_else(|| anyhow::anyhow!("--secret-key required for S3 backend"))?;
            BackendConfig::S3 {
                endpoint,
                region: args.region,
                access_key,
                secret_key,
                public_read: !args.private,
            }
        }
        other => anyhow::bail!("unknown backend: {other} (supported: local, s3)"),
    };

    let config = AppConfig {
        storage: StorageConfig {
            container: args.container,
            backend,
        },
    };
    config.open_storage()?;
    let path = config.save(config_path)?;

    info!(config_path = %path.display(), "Config saved");
    println!("Config written to {}", path.display());
    Ok(())
}
