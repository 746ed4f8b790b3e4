//! Dataset registry: the local collection of datasets and the current selection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use curator_client::CurationApi;
use curator_shared::{CuratorError, Dataset, DatasetId, DeleteDatasetResponse, Result};

use crate::state::StateCell;

/// Observable registry state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    /// Datasets from the most recent successful listing plus local inserts.
    pub datasets: Vec<Dataset>,
    /// Id of the selected dataset, if any.
    pub selected: Option<DatasetId>,
    /// A list or delete call is outstanding.
    pub loading: bool,
    /// Message of the last failed call; cleared when a new call starts.
    pub error: Option<String>,
    /// When the collection was last replaced by a listing.
    pub refreshed_at: Option<DateTime<Utc>>,
    in_flight: u32,
}

impl RegistryState {
    pub fn get(&self, id: &DatasetId) -> Option<&Dataset> {
        self.datasets.iter().find(|d| &d.id == id)
    }

    /// The selected dataset, if it is still in the collection.
    pub fn selected_dataset(&self) -> Option<&Dataset> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    fn begin(&mut self) {
        self.in_flight += 1;
        self.loading = true;
        self.error = None;
    }

    fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = self.in_flight > 0;
    }
}

/// Owns the dataset collection and the selection.
pub struct DatasetRegistry {
    api: Arc<dyn CurationApi>,
    state: StateCell<RegistryState>,
}

impl DatasetRegistry {
    pub fn new(api: Arc<dyn CurationApi>) -> Self {
        Self {
            api,
            state: StateCell::new(RegistryState::default()),
        }
    }

    /// Fetch all datasets and replace the local collection.
    ///
    /// On failure the collection is left untouched, the error is recorded, and
    /// an empty list is returned for this call only.
    #[instrument(skip_all)]
    pub async fn list(&self) -> Vec<Dataset> {
        self.state.update(RegistryState::begin);

        match self.api.list_datasets().await {
            Ok(datasets) => {
                info!(count = datasets.len(), "dataset list refreshed");
                self.state.update(|s| {
                    s.finish();
                    s.datasets = datasets.clone();
                    s.refreshed_at = Some(Utc::now());
                });
                datasets
            }
            Err(e) => {
                warn!(error = %e, "failed to list datasets");
                self.state.update(|s| {
                    s.finish();
                    s.error = Some(e.user_message());
                });
                Vec::new()
            }
        }
    }

    /// Look up a dataset by id, loading the collection once if it is empty.
    pub async fn find(&self, id: &DatasetId) -> Result<Dataset> {
        self.lookup(|d| &d.id == id, || format!("dataset '{id}'"))
            .await
    }

    /// Look up a dataset by name, with the same lazy-load rule as [`find`](Self::find).
    pub async fn find_by_name(&self, name: &str) -> Result<Dataset> {
        self.lookup(|d| d.name == name, || format!("dataset named '{name}'"))
            .await
    }

    async fn lookup(
        &self,
        matches: impl Fn(&Dataset) -> bool,
        describe: impl FnOnce() -> String,
    ) -> Result<Dataset> {
        let (found, empty) = self.state.read(|s| {
            (
                s.datasets.iter().find(|d| matches(d)).cloned(),
                s.datasets.is_empty(),
            )
        });
        if let Some(dataset) = found {
            return Ok(dataset);
        }
        if !empty {
            return Err(CuratorError::not_found(describe()));
        }

        debug!("registry empty, loading datasets before lookup");
        self.list()
            .await
            .into_iter()
            .find(|d| matches(d))
            .ok_or_else(|| CuratorError::not_found(describe()))
    }

    /// Delete a dataset on the service and drop it locally.
    ///
    /// Clears the selection when the removed dataset was selected.
    #[instrument(skip_all, fields(dataset_id = %id))]
    pub async fn remove(&self, id: &DatasetId) -> Result<DeleteDatasetResponse> {
        self.state.update(RegistryState::begin);

        match self.api.delete_dataset(id).await {
            Ok(response) => {
                info!(records_deleted = response.records_deleted, "dataset deleted");
                self.state.update(|s| {
                    s.finish();
                    s.datasets.retain(|d| &d.id != id);
                    if s.selected.as_ref() == Some(id) {
                        s.selected = None;
                    }
                });
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "failed to delete dataset");
                self.state.update(|s| {
                    s.finish();
                    s.error = Some(e.user_message());
                });
                Err(e)
            }
        }
    }

    /// Select a dataset, resolving it through [`find`](Self::find).
    pub async fn select(&self, id: &DatasetId) -> Result<Dataset> {
        let dataset = self.find(id).await?;
        self.state.update(|s| s.selected = Some(dataset.id.clone()));
        Ok(dataset)
    }

    pub fn selected(&self) -> Option<Dataset> {
        self.state.read(|s| s.selected_dataset().cloned())
    }

    pub fn clear_selection(&self) {
        self.state.update_if(|s| s.selected.take().is_some());
    }

    /// Record a dataset observed outside a listing.
    pub fn insert(&self, dataset: Dataset) {
        self.state.update(|s| {
            match s.datasets.iter_mut().find(|d| d.id == dataset.id) {
                Some(existing) => *existing = dataset,
                None => s.datasets.push(dataset),
            }
        });
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<RegistryState> {
        self.state.subscribe()
    }
}
