//! Export of a curated dataset to an external evaluation store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

use curator_client::CurationApi;
use curator_shared::{CuratorError, Result};

use crate::state::StateCell;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportState {
    pub loading: bool,
    pub error: Option<String>,
    /// Response body of the last successful export.
    pub last_export: Option<Value>,
    pub exported_at: Option<DateTime<Utc>>,
}

pub struct ExportService {
    api: Arc<dyn CurationApi>,
    state: StateCell<ExportState>,
}

impl ExportService {
    pub fn new(api: Arc<dyn CurationApi>) -> Self {
        Self {
            api,
            state: StateCell::new(ExportState::default()),
        }
    }

    /// Export `dataset_name`, optionally under a different name on the target.
    #[instrument(skip_all, fields(dataset_name = %dataset_name))]
    pub async fn export(
        &self,
        dataset_name: &str,
        langfuse_dataset_name: Option<&str>,
    ) -> Result<Value> {
        if dataset_name.trim().is_empty() {
            return Err(CuratorError::validation("dataset name must not be empty"));
        }

        self.state.update(|s| {
            s.loading = true;
            s.error = None;
        });

        match self
            .api
            .export_to_langfuse(dataset_name, langfuse_dataset_name)
            .await
        {
            Ok(body) => {
                info!(dataset_name, "dataset exported");
                self.state.update(|s| {
                    s.loading = false;
                    s.last_export = Some(body.clone());
                    s.exported_at = Some(Utc::now());
                });
                Ok(body)
            }
            Err(e) => {
                warn!(error = %e, "export failed");
                self.state.update(|s| {
                    s.loading = false;
                    s.error = Some(e.user_message());
                });
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> ExportState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ExportState> {
        self.state.subscribe()
    }
}
