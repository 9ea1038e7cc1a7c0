use std::path::Path;

use anyhow::Result;
use clap::Args;

use bucketeer_core::object::VersionedListPage;

use crate::config::AppConfig;

#[derive(Args)]
pub struct VersionsArgs {
    /// Start listing after this key
    #[arg(long)]
    key_marker: Option<String>,

    /// Resume inside the --key-marker key's versions, after this version id
    #[arg(long, requires = "key_marker")]
    version_id_marker: Option<String>,

    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: VersionsArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;
    let page = storage
        .list_object_versions(
            args.key_marker.as_deref(),
            args.version_id_marker.as_deref(),
            args.bucket.as_deref(),
        )
        .await?;

    if page.versions.is_empty() {
        println!("No versions found.");
        return Ok(());
    }

    println!(
        "{:<40} {:<34} {:<7} {:<10} {:<20}",
        "KEY", "VERSION", "LATEST", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(115));
    for version in &page.versions {
        let size = if version.is_delete_marker {
            "(deleted)".to_string()
        } else {
            format_bytes(version.size)
        };
        println!(
            "{:<40} {:<34} {:<7} {:<10} {:<20}",
            version.key.as_str(),
            version.version_id,
            if version.is_latest { "yes" } else { "" },
            size,
            version
                .last_modified
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    if let Some(hint) = resume_hint(&page) {
        println!("\nMore versions available: {hint}");
    }
    Ok(())
}

/// Arguments that fetch the page after `page`.
fn resume_hint(page: &VersionedListPage) -> Option<String> {
    let key = page.next_key_marker.as_deref()?;
    Some(match page.next_version_id_marker.as_deref() {
        Some(version) => format!("--key-marker {key} --version-id-marker {version}"),
        None => format!("--key-marker {key}"),
    })
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(key: Option<&str>, version: Option<&str>) -> VersionedListPage {
        VersionedListPage {
            versions: Vec::new(),
            next_key_marker: key.map(str::to_string),
            next_version_id_marker: version.map(str::to_string),
        }
    }

    #[test]
    fn resume_hint_includes_version_marker() {
        assert_eq!(
            resume_hint(&page(Some("photo.jpg"), Some("v-3"))).as_deref(),
            Some("--key-marker photo.jpg --version-id-marker v-3")
        );
        assert_eq!(
            resume_hint(&page(Some("photo.jpg"), None)).as_deref(),
            Some("--key-marker photo.jpg")
        );
        assert_eq!(resume_hint(&page(None, None)), None);
    }
}
