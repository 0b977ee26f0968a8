//! Persisted dashboard settings (default filters and date range).
//!
//! [`SettingsRepository`] is the async load/save contract.
//! [`JsonFileRepository`] keeps settings in a JSON document on disk and
//! [`InMemoryRepository`] keeps them for the lifetime of the process.
//! [`open_repository`] picks one from an explicit [`SettingsBackend`].

mod file;
mod memory;

pub use file::JsonFileRepository;
pub use memory::InMemoryRepository;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

use crate::costs::DEFAULT_BATCH_SIZE;
use crate::selection::{self, Selection};

/// Dashboard state worth keeping between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch_size: usize,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub vehicle_keys: Vec<String>,
    pub category_keys: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            date_from: None,
            date_to: None,
            vehicle_keys: Vec::new(),
            category_keys: Vec::new(),
        }
    }
}

impl Settings {
    /// The saved filters as a normalized [`Selection`].
    pub fn selection(&self) -> Selection {
        selection::normalize(&json!({
            "vehicleKeys": self.vehicle_keys,
            "categoryKeys": self.category_keys,
            "dateFrom": self.date_from.map(|d| d.format("%Y-%m-%d").to_string()),
            "dateTo": self.date_to.map(|d| d.format("%Y-%m-%d").to_string()),
        }))
    }
}

/// Load/save contract for [`Settings`].
#[async_trait::async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Returns the stored settings, or defaults when nothing was saved yet.
    async fn load(&self) -> Result<Settings>;
    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// Which repository implementation to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsBackend {
    File(PathBuf),
    Memory,
}

pub fn open_repository(backend: &SettingsBackend) -> Box<dyn SettingsRepository> {
    match backend {
        SettingsBackend::File(path) => Box::new(JsonFileRepository::new(path.clone())),
        SettingsBackend::Memory => Box::new(InMemoryRepository::default()),
    }
}
