use std::path::Path;

use anyhow::Result;
use clap::Args;
use console::style;

use bucketeer_core::ObjectKey;

use crate::config::AppConfig;

#[derive(Args)]
pub struct DeleteManyArgs {
    /// Object keys (at most 1000)
    #[arg(required = true)]
    keys: Vec<String>,

    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: DeleteManyArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;

    let keys: Vec<ObjectKey> = args.keys.into_iter().map(ObjectKey::from).collect();
    let result = storage.delete_objects(&keys, args.bucket.as_deref()).await?;

    for key in result.deleted() {
        println!("{} {key}", style("deleted").green());
    }
    for (key, reason) in result.failed() {
        println!("{} {key}: {reason}", style("failed ").red());
    }

    if !result.is_ok() {
        anyhow::bail!("{} of {} objects could not be deleted", result.failed().len(), keys.len());
    }
    Ok(())
}
