use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::config::AppConfig;
use crate::progress;

#[derive(Args)]
pub struct UploadArgs {
    /// Local file to upload
    file: PathBuf,

    /// Object key (default: the file name)
    #[arg(long)]
    key: Option<String>,

    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: UploadArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;

    let key = match args.key {
        Some(key) => key,
        None => args
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a key from {}", args.file.display()))?,
    };

    let spinner = progress::create_spinner(&format!("Uploading {key}..."));
    let url = storage
        .upload_file(&args.file, &key, args.bucket.as_deref())
        .await;
    spinner.finish_and_clear();

    let url = url.with_context(|| format!("failed to upload {}", args.file.display()))?;
    println!("{url}");
    Ok(())
}
