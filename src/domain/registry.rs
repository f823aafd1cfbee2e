//! Named datasets with one active entry.
//!
//! Datasets are handed out as `Arc<Dataset>`, so switching or unloading the
//! active dataset never disturbs an evaluation that already holds a handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::dataset::Dataset;
use crate::domain::error::LookupError;

pub const DEFAULT_DATASET_ID: &str = "Main";

#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, Arc<Dataset>>,
    active: Option<String>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dataset` under `id` and make it active, replacing any
    /// dataset previously stored under the same id.
    pub fn insert(&mut self, id: impl Into<String>, dataset: Dataset) -> Arc<Dataset> {
        let id = id.into();
        let handle = Arc::new(dataset);
        self.datasets.insert(id.clone(), Arc::clone(&handle));
        self.active = Some(id);
        handle
    }

    pub fn switch_to(&mut self, id: &str) -> Result<Arc<Dataset>, LookupError> {
        let handle = self.get(id)?;
        self.active = Some(id.to_string());
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Dataset>, LookupError> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::UnknownDataset(id.to_string()))
    }

    /// Remove `id`. Unloading the active dataset leaves nothing active.
    pub fn unload(&mut self, id: &str) -> Result<(), LookupError> {
        self.datasets
            .remove(id)
            .ok_or_else(|| LookupError::UnknownDataset(id.to_string()))?;
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        Ok(())
    }

    pub fn active(&self) -> Option<Arc<Dataset>> {
        self.active
            .as_deref()
            .and_then(|id| self.datasets.get(id))
            .cloned()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }
}
