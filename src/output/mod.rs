use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

/// Writes crawl results as pretty-printed JSON files into one directory.
///
/// Files are UTF-8 with non-ASCII characters left unescaped and two-space
/// indentation.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn write<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;

        let path = self.dir.join(file_name);
        let mut json = serde_json::to_vec_pretty(value)?;
        json.push(b'\n');

        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!("Data saved to {}", path.display());
        Ok(path)
    }
}
