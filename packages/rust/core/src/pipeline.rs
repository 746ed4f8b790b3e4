//! Generate → analyze → clean pipeline.
//!
//! Each stage is an independently tracked async operation with its own
//! status. Calls are fenced per stage by a ticket: the most recently issued
//! call wins, and [`PipelineController::reset`] invalidates every outstanding
//! one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, instrument, warn};
use url::Url;

use curator_client::CurationApi;
use curator_shared::{
    AnalysisResult, CleaningResult, CuratorError, DatasetId, GenerationConfig, GenerationRequest,
    GenerationResult, Result, Stage, StageOutput, StageStatus,
};

use crate::registry::DatasetRegistry;
use crate::state::StateCell;

/// Optional knobs for a generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub target_language: Option<String>,
    pub model_qa: Option<String>,
    pub model_cleaning: Option<String>,
    pub similarity_threshold: Option<f64>,
}

impl From<&GenerationConfig> for GenerateOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            target_language: config.target_language.clone(),
            model_qa: config.model_qa.clone(),
            model_cleaning: config.model_cleaning.clone(),
            similarity_threshold: Some(config.similarity_threshold),
        }
    }
}

/// Observable pipeline state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub generation: StageStatus,
    pub analysis: StageStatus,
    pub cleaning: StageStatus,
    pub generation_result: Option<GenerationResult>,
    pub analysis_result: Option<AnalysisResult>,
    pub cleaning_result: Option<CleaningResult>,
    /// Message of the most recent stage failure.
    pub error: Option<String>,
    /// The dataset currently being processed.
    pub selected_dataset_id: Option<DatasetId>,
}

impl PipelineState {
    pub fn status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Generation => self.generation,
            Stage::Analysis => self.analysis,
            Stage::Cleaning => self.cleaning,
        }
    }

    pub fn any_pending(&self) -> bool {
        Stage::ALL.iter().any(|&stage| self.status(stage).is_pending())
    }

    /// Results of every stage that has one, in pipeline order.
    pub fn outputs(&self) -> Vec<StageOutput> {
        let mut outputs = Vec::new();
        if let Some(r) = &self.generation_result {
            outputs.push(StageOutput::Generation(r.clone()));
        }
        if let Some(r) = &self.analysis_result {
            outputs.push(StageOutput::Analysis(r.clone()));
        }
        if let Some(r) = &self.cleaning_result {
            outputs.push(StageOutput::Cleaning(r.clone()));
        }
        outputs
    }

    fn set_status(&mut self, stage: Stage, next: StageStatus) {
        let slot = match stage {
            Stage::Generation => &mut self.generation,
            Stage::Analysis => &mut self.analysis,
            Stage::Cleaning => &mut self.cleaning,
        };
        if *slot == next {
            return;
        }
        debug_assert!(
            slot.can_transition_to(next),
            "illegal {stage} transition {slot} -> {next}"
        );
        *slot = next;
    }
}

/// Drives the three pipeline stages against one dataset at a time.
pub struct PipelineController {
    api: Arc<dyn CurationApi>,
    registry: Arc<DatasetRegistry>,
    similarity_threshold: Option<f64>,
    tickets: [AtomicU64; 3],
    state: StateCell<PipelineState>,
}

impl PipelineController {
    pub fn new(api: Arc<dyn CurationApi>, registry: Arc<DatasetRegistry>) -> Self {
        Self {
            api,
            registry,
            similarity_threshold: None,
            tickets: Default::default(),
            state: StateCell::new(PipelineState::default()),
        }
    }

    /// Threshold sent with analyze and clean; the service default applies when unset.
    pub fn with_similarity_threshold(mut self, threshold: Option<f64>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Generate a dataset from `url`.
    ///
    /// Empty inputs and unparseable URLs are rejected before any request. On
    /// success the dataset becomes the selected one and is recorded in the
    /// registry, which is then refreshed. The registry is updated even when a
    /// reset or a newer generation has superseded this call, since the dataset
    /// exists on the server either way.
    #[instrument(skip_all, fields(url = %url, name = %name))]
    pub async fn generate(
        &self,
        url: &str,
        name: &str,
        options: GenerateOptions,
    ) -> Result<GenerationResult> {
        let request = generation_request(url, name, options)?;
        let ticket = self.begin(Stage::Generation);

        match self.api.generate_dataset(&request).await {
            Ok(result) => {
                let applied = self.settle(Stage::Generation, ticket, StageStatus::Success, |s| {
                    s.generation_result = Some(result.clone());
                    s.selected_dataset_id = Some(result.dataset_id.clone());
                    // Results of earlier runs describe another dataset.
                    for stage in [Stage::Analysis, Stage::Cleaning] {
                        if !s.status(stage).is_pending() {
                            s.set_status(stage, StageStatus::Idle);
                        }
                    }
                    if !s.analysis.is_pending() {
                        s.analysis_result = None;
                    }
                    if !s.cleaning.is_pending() {
                        s.cleaning_result = None;
                    }
                });

                info!(
                    dataset_id = %result.dataset_id,
                    total_questions = result.total_questions,
                    processing_time = result.processing_time,
                    "dataset generated"
                );
                if !applied {
                    debug!("generation superseded; pipeline state left untouched");
                }
                self.registry.insert(result.to_dataset());
                self.registry.list().await;
                Ok(result)
            }
            Err(e) => {
                self.fail(Stage::Generation, ticket, &e);
                Err(e)
            }
        }
    }

    /// Analyze similarities in a dataset.
    ///
    /// `dataset_id` falls back to the selected dataset, then the last
    /// generated one. Only a failed
    /// resolution is returned as an error; a failed call is recorded in the
    /// state and yields `Ok(None)`.
    pub async fn analyze(&self, dataset_id: Option<&DatasetId>) -> Result<Option<AnalysisResult>> {
        let id = self.resolve_dataset_id(dataset_id).await?;
        Ok(self.analyze_dataset(&id).await.ok())
    }

    /// Remove near-duplicate records from a dataset.
    ///
    /// Resolution and error handling match [`analyze`](Self::analyze). Not
    /// blocked on a prior analysis; see [`can_clean`](Self::can_clean).
    pub async fn clean(&self, dataset_id: Option<&DatasetId>) -> Result<Option<CleaningResult>> {
        let id = self.resolve_dataset_id(dataset_id).await?;
        Ok(self.clean_dataset(&id).await.ok())
    }

    /// Generate, analyze, then clean, stopping at the first failed stage.
    #[instrument(skip_all, fields(url = %url, name = %name))]
    pub async fn run(
        &self,
        url: &str,
        name: &str,
        options: GenerateOptions,
    ) -> Result<Vec<StageOutput>> {
        let generation = self.generate(url, name, options).await?;
        let id = generation.dataset_id.clone();

        let analysis = self.analyze_dataset(&id).await?;
        let cleaning = self.clean_dataset(&id).await?;

        info!(
            dataset_id = %id,
            similar_pairs = analysis.similar_pairs_found,
            removed = cleaning.removed_records,
            "pipeline complete"
        );
        Ok(vec![
            StageOutput::Generation(generation),
            StageOutput::Analysis(analysis),
            StageOutput::Cleaning(cleaning),
        ])
    }

    #[instrument(skip_all, fields(dataset_id = %id))]
    async fn analyze_dataset(&self, id: &DatasetId) -> Result<AnalysisResult> {
        let ticket = self.begin(Stage::Analysis);

        match self.api.analyze_similarities(id, self.similarity_threshold).await {
            Ok(result) => {
                self.settle(Stage::Analysis, ticket, StageStatus::Success, |s| {
                    s.analysis_result = Some(result.clone());
                    s.selected_dataset_id = Some(id.clone());
                });
                info!(
                    similar_pairs = result.similar_pairs_found,
                    total_records = result.total_records,
                    "similarity analysis complete"
                );
                Ok(result)
            }
            Err(e) => {
                self.fail(Stage::Analysis, ticket, &e);
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(dataset_id = %id))]
    async fn clean_dataset(&self, id: &DatasetId) -> Result<CleaningResult> {
        let ticket = self.begin(Stage::Cleaning);

        match self.api.clean_similarities(id, self.similarity_threshold).await {
            Ok(result) => {
                let applied = self.settle(Stage::Cleaning, ticket, StageStatus::Success, |s| {
                    s.cleaning_result = Some(result.clone());
                    s.selected_dataset_id = Some(id.clone());
                });
                info!(removed = result.removed_records, "similarity cleaning complete");
                if applied {
                    self.registry.list().await;
                }
                Ok(result)
            }
            Err(e) => {
                self.fail(Stage::Cleaning, ticket, &e);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Gating and observation
    // -----------------------------------------------------------------------

    /// A dataset is resolvable and no stage is running.
    pub fn can_analyze(&self) -> bool {
        self.state.read(|s| {
            let selected = s.selected_dataset_id.as_ref().is_some_and(|id| !id.is_blank());
            !s.any_pending() && (selected || s.generation_result.is_some())
        })
    }

    /// Analysis succeeded and no stage is running.
    pub fn can_clean(&self) -> bool {
        self.state
            .read(|s| !s.any_pending() && s.analysis == StageStatus::Success)
    }

    /// Return every stage to idle and drop all results. Late responses from
    /// calls issued before the reset are discarded.
    pub fn reset(&self) {
        for ticket in &self.tickets {
            ticket.fetch_add(1, Ordering::SeqCst);
        }
        self.state.update(|s| *s = PipelineState::default());
        debug!("pipeline reset");
    }

    pub fn snapshot(&self) -> PipelineState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Explicit id, then the selected dataset, then the last generation's id,
    /// then a registry lookup by the generated dataset's name.
    async fn resolve_dataset_id(&self, explicit: Option<&DatasetId>) -> Result<DatasetId> {
        if let Some(id) = explicit.filter(|id| !id.is_blank()) {
            return Ok(id.clone());
        }
        let selected = self.state.read(|s| {
            s.selected_dataset_id
                .clone()
                .filter(|id| !id.is_blank())
        });
        if let Some(id) = selected {
            return Ok(id);
        }

        let generated = self.state.read(|s| {
            s.generation_result
                .as_ref()
                .map(|r| (r.dataset_id.clone(), r.dataset_name.clone()))
        });
        match generated {
            Some((id, _)) if !id.is_blank() => Ok(id),
            Some((_, name)) => Ok(self.registry.find_by_name(&name).await?.id),
            None => Err(CuratorError::not_found(
                "dataset to process (no id given and nothing generated yet)",
            )),
        }
    }

    fn begin(&self, stage: Stage) -> u64 {
        let ticket = self.tickets[stage.index()].fetch_add(1, Ordering::SeqCst) + 1;
        self.state.update(|s| {
            s.set_status(stage, StageStatus::Pending);
            s.error = None;
        });
        debug!(%stage, ticket, "stage started");
        ticket
    }

    /// Apply a stage outcome if `ticket` is still the latest for `stage`.
    fn settle(
        &self,
        stage: Stage,
        ticket: u64,
        status: StageStatus,
        apply: impl FnOnce(&mut PipelineState),
    ) -> bool {
        let current = &self.tickets[stage.index()];
        let applied = self.state.update_if(|s| {
            if current.load(Ordering::SeqCst) != ticket {
                return false;
            }
            s.set_status(stage, status);
            apply(s);
            true
        });
        if !applied {
            debug!(%stage, ticket, "discarding stale stage result");
        }
        applied
    }

    fn fail(&self, stage: Stage, ticket: u64, error: &CuratorError) {
        warn!(%stage, error = %error, "stage failed");
        let message = error.user_message();
        self.settle(stage, ticket, StageStatus::Error, |s| s.error = Some(message));
    }
}

fn generation_request(url: &str, name: &str, options: GenerateOptions) -> Result<GenerationRequest> {
    let url = url.trim();
    let name = name.trim();
    if url.is_empty() {
        return Err(CuratorError::validation("url must not be empty"));
    }
    if name.is_empty() {
        return Err(CuratorError::validation("dataset name must not be empty"));
    }
    Url::parse(url).map_err(|e| CuratorError::validation(format!("invalid url '{url}': {e}")))?;

    Ok(GenerationRequest {
        url: url.to_string(),
        dataset_name: name.to_string(),
        target_language: options.target_language,
        model_qa: options.model_qa,
        model_cleaning: options.model_cleaning,
        similarity_threshold: options.similarity_threshold,
    })
}
