use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::harvester::HarvestOutcome;

pub const ARTICLES_FILE: &str = "articles.json";
pub const AUTHORS_FILE: &str = "authors.json";

/// Write the outcome's articles and author rows as JSON arrays under `dir`.
pub async fn write_outcome(dir: &Path, outcome: &HarvestOutcome) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let articles = write_json(dir.join(ARTICLES_FILE), &outcome.articles).await?;
    let authors = write_json(dir.join(AUTHORS_FILE), &outcome.authors).await?;
    info!(
        "Wrote {} articles to {} and {} authors to {}",
        outcome.articles.len(),
        articles.display(),
        outcome.authors.len(),
        authors.display()
    );
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: PathBuf, value: &T) -> anyhow::Result<PathBuf> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
