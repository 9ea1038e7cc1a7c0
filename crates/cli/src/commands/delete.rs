use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::AppConfig;

#[derive(Args)]
pub struct DeleteArgs {
    /// Object key
    key: String,

    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: DeleteArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;

    match storage.delete_object(&args.key, args.bucket.as_deref()).await {
        Ok(()) => {
            println!("Deleted {}", args.key);
            Ok(())
        }
        Err(e) if e.is_not_found() => anyhow::bail!("object '{}' not found", args.key),
        Err(e) => Err(e.into()),
    }
}
