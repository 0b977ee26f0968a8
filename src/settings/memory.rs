use anyhow::{Result, anyhow};
use std::sync::Mutex;

use super::{Settings, SettingsRepository};

/// Process-local settings, lost on exit.
#[derive(Default)]
pub struct InMemoryRepository {
    settings: Mutex<Option<Settings>>,
}

impl InMemoryRepository {
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for InMemoryRepository {
    async fn load(&self) -> Result<Settings> {
        let guard = self
            .settings
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        *self
            .settings
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))? = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = InMemoryRepository::default();
        let settings = Settings {
            batch_size: 10,
            category_keys: vec!["Light".into()],
            ..Default::default()
        };

        repo.save(&settings).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_seeded_repository() {
        let repo = InMemoryRepository::with_settings(Settings {
            batch_size: 5,
            ..Default::default()
        });
        assert_eq!(repo.load().await.unwrap().batch_size, 5);
    }
}
