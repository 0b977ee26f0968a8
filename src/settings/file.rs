use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use super::{Settings, SettingsRepository};

/// Settings stored as a pretty-printed JSON document.
///
/// ```json
/// {
///   "batch_size": 40,
///   "date_from": "2024-04-01",
///   "date_to": "2024-04-30",
///   "vehicle_keys": ["V1"],
///   "category_keys": []
/// }
/// ```
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for JsonFileRepository {
    async fn load(&self) -> Result<Settings> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read settings from {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid settings file {}", self.path.display()))
    }

    /// Writes to a sibling temp file first, then renames over the target.
    async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(settings)?)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}
