//! Client-side orchestration core for Curator.
//!
//! Stores in this crate keep a local view of the curation service:
//! - [`DatasetRegistry`]: dataset collection and selection
//! - [`PagedFeed`]: paginated QA items for one dataset
//! - [`PipelineController`]: generate → analyze → clean stage tracking
//! - [`ExportService`]: dataset export
//!
//! Each store exposes `snapshot()` and `subscribe()` over a [`StateCell`].

pub mod export;
pub mod feed;
pub mod pipeline;
pub mod registry;
pub mod state;

use std::sync::Arc;

use curator_client::{ApiClient, CurationApi};
use curator_shared::{AppConfig, ClientConfig, Result};

pub use export::{ExportService, ExportState};
pub use feed::{DEFAULT_PAGE_LIMIT, FetchMode, FetchOptions, PageState, PagedFeed};
pub use pipeline::{GenerateOptions, PipelineController, PipelineState};
pub use registry::{DatasetRegistry, RegistryState};
pub use state::StateCell;

/// All stores wired to one service connection.
pub struct Curator {
    pub registry: Arc<DatasetRegistry>,
    pub feed: PagedFeed,
    pub pipeline: PipelineController,
    pub export: ExportService,
}

impl Curator {
    /// Connect to the service described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api = ApiClient::new(&ClientConfig::from(config))?;
        Ok(Self::with_api(Arc::new(api), config))
    }

    /// Build the stores on top of an existing API implementation.
    pub fn with_api(api: Arc<dyn CurationApi>, config: &AppConfig) -> Self {
        let registry = Arc::new(DatasetRegistry::new(api.clone()));
        let pipeline = PipelineController::new(api.clone(), registry.clone())
            .with_similarity_threshold(config.similarity.threshold);

        Self {
            feed: PagedFeed::with_page_size(api.clone(), u64::from(config.pagination.page_size)),
            export: ExportService::new(api),
            registry,
            pipeline,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{analysis_json, cleaning_json, dataset_json, generation_json, qa_page_json};
    use curator_shared::{DatasetId, StageStatus};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_analyze_clean_then_page() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dataset/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_json("abc", "ds1", 42)))
            .expect(1)
            .mount(&server)
            .await;
        // One refresh after generation, one after cleaning.
        Mock::given(method("GET"))
            .and(path("/dataset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([dataset_json("abc", "ds1")])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dataset/abc/analyze-similarities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json("abc", 42, 3)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dataset/abc/clean-similarities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cleaning_json("abc", 42, 3)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("limit", "10"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(qa_page_json("abc", 0, 10, 39)))
            .expect(1)
            .mount(&server)
            .await;

        let curator = Curator::with_api(test_support::api_for(&server), &AppConfig::default());
        let pipeline = &curator.pipeline;

        pipeline
            .generate("https://ex.com", "ds1", GenerateOptions::default())
            .await
            .unwrap();

        let analysis = pipeline.analyze(None).await.unwrap().unwrap();
        assert_eq!(analysis.similar_pairs_found, 3);
        assert_eq!(pipeline.snapshot().analysis, StageStatus::Success);
        assert!(pipeline.can_clean());

        let cleaning = pipeline.clean(None).await.unwrap().unwrap();
        assert_eq!(cleaning.removed_records, 3);

        let state = pipeline.snapshot();
        assert_eq!(state.cleaning, StageStatus::Success);
        assert_eq!(state.outputs().len(), 3);

        let id = DatasetId::from("abc");
        let page = curator.feed.go_to_page(&id, 1).await.unwrap();
        assert!(page.returned_count <= 39);
        assert_eq!(curator.feed.snapshot().total_count, 39);
    }

    #[tokio::test]
    async fn pipeline_subscribers_observe_stage_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dataset/abc/analyze-similarities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json("abc", 42, 1)))
            .mount(&server)
            .await;

        let curator = Curator::with_api(test_support::api_for(&server), &AppConfig::default());
        let mut rx = curator.pipeline.subscribe();

        curator
            .pipeline
            .analyze(Some(&"abc".into()))
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().analysis, StageStatus::Success);
    }
}
