//! Domain and wire types for the dataset-curation service.
//!
//! Field names follow the service's snake_case JSON schema.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DatasetId
// ---------------------------------------------------------------------------

/// Server-assigned dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id the service could never have assigned.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DatasetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// A dataset known to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Number of QA sources attached to the dataset.
    #[serde(
        default,
        rename = "qa_sources_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub qa_count: Option<u64>,
}

/// Response to `DELETE /dataset/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDatasetResponse {
    pub message: String,
    pub dataset_id: DatasetId,
    pub records_deleted: u64,
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// One of the three dependent pipeline operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generation,
    Analysis,
    Cleaning,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Generation, Stage::Analysis, Stage::Cleaning];

    pub fn index(self) -> usize {
        match self {
            Self::Generation => 0,
            Self::Analysis => 1,
            Self::Cleaning => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Analysis => write!(f, "analysis"),
            Self::Cleaning => write!(f, "cleaning"),
        }
    }
}

/// Status of a single pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl StageStatus {
    /// Whether `next` is a legal transition from `self`.
    ///
    /// `Pending` is entered from any settled state; `Success`/`Error` only from `Pending`.
    /// `Idle` is reachable from anywhere through an explicit reset.
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        match next {
            StageStatus::Idle => true,
            StageStatus::Pending => self != StageStatus::Pending,
            StageStatus::Success | StageStatus::Error => self == StageStatus::Pending,
        }
    }

    pub fn is_pending(self) -> bool {
        self == StageStatus::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Body of `POST /dataset/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub url: String,
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_qa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_cleaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
}

/// A generated question/answer pair (no id yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Result of a successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(rename = "id")]
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    #[serde(default)]
    pub qa_pairs: Vec<QaPair>,
    pub total_questions: u64,
    /// Server-side processing time in seconds.
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_qa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_cleaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
}

impl GenerationResult {
    /// The registry entry this generation created.
    pub fn to_dataset(&self) -> Dataset {
        Dataset {
            id: self.dataset_id.clone(),
            name: self.dataset_name.clone(),
            description: None,
            created_at: None,
            qa_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Similarity analysis / cleaning
// ---------------------------------------------------------------------------

/// Two records judged near-duplicates by the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub record1_id: String,
    pub record2_id: String,
    pub similarity: f64,
    pub question1: String,
    pub question2: String,
}

/// Result of `GET /dataset/{id}/analyze-similarities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub dataset_name: String,
    pub threshold: f64,
    pub total_records: u64,
    pub similar_pairs_found: u64,
    #[serde(default)]
    pub similarities: Vec<SimilarityPair>,
}

/// A kept/removed pair decided by the cleaning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedPair {
    pub keep_id: String,
    pub remove_id: String,
    pub similarity: f64,
    pub keep_question: String,
    pub remove_question: String,
}

/// A record deleted by the cleaning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub id: String,
    pub question: String,
    pub similarity: f64,
    pub kept_id: String,
}

/// Result of `POST /dataset/{id}/clean-similarities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningResult {
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub dataset_name: String,
    pub threshold: f64,
    pub total_records: u64,
    pub removed_records: u64,
    #[serde(default)]
    pub details: Vec<CleanedPair>,
    #[serde(default)]
    pub removed_items: Vec<RemovedRecord>,
}

/// Output of one pipeline stage, discriminated by stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "result", rename_all = "lowercase")]
pub enum StageOutput {
    Generation(GenerationResult),
    Analysis(AnalysisResult),
    Cleaning(CleaningResult),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Generation(_) => Stage::Generation,
            Self::Analysis(_) => Stage::Analysis,
            Self::Cleaning(_) => Stage::Cleaning,
        }
    }

    pub fn dataset_id(&self) -> &DatasetId {
        match self {
            Self::Generation(r) => &r.dataset_id,
            Self::Analysis(r) => &r.dataset_id,
            Self::Cleaning(r) => &r.dataset_id,
        }
    }
}

// ---------------------------------------------------------------------------
// QA items
// ---------------------------------------------------------------------------

/// A stored question/answer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One page of `GET /q_a/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPage {
    #[serde(default)]
    pub dataset_name: String,
    pub dataset_id: DatasetId,
    pub total_count: u64,
    pub returned_count: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub qa_data: Vec<QaItem>,
}
