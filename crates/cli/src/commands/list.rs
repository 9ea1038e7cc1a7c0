use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::AppConfig;

#[derive(Args)]
pub struct ListArgs {
    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: ListArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;
    let page = storage.list_objects(args.bucket.as_deref()).await?;

    if page.keys.is_empty() {
        println!("No objects found.");
        return Ok(());
    }
    for key in &page.keys {
        println!("{key}");
    }
    if !page.is_last() {
        println!("... more objects not shown ({} listed)", page.keys.len());
    }
    Ok(())
}
