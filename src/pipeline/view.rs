use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::{Document, GoldDistribution, SilverChunk};
use crate::status::{GoldLayer, LayerStatus, ProcessingStatus};

use super::stats::LayerCounts;

const BRONZE_IN_PROGRESS_PERCENT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Bronze,
    Silver,
    GoldA,
    GoldB,
    GoldC,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 5] = [
        PipelineStage::Bronze,
        PipelineStage::Silver,
        PipelineStage::GoldA,
        PipelineStage::GoldB,
        PipelineStage::GoldC,
    ];

    pub fn gold_layer(self) -> Option<GoldLayer> {
        match self {
            PipelineStage::GoldA => Some(GoldLayer::Analytics),
            PipelineStage::GoldB => Some(GoldLayer::Graph),
            PipelineStage::GoldC => Some(GoldLayer::Vector),
            PipelineStage::Bronze | PipelineStage::Silver => None,
        }
    }

    fn for_layer(layer: GoldLayer) -> Self {
        match layer {
            GoldLayer::Analytics => PipelineStage::GoldA,
            GoldLayer::Graph => PipelineStage::GoldB,
            GoldLayer::Vector => PipelineStage::GoldC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: PipelineStage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageView {
    fn new(stage: PipelineStage, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            progress: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    fn progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent);
        self
    }

    fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    fn started(mut self, at: Option<NaiveDateTime>) -> Self {
        self.started_at = at.map(utc);
        self
    }

    fn completed(mut self, at: Option<NaiveDateTime>) -> Self {
        self.completed_at = at.map(utc);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineView {
    pub stages: Vec<StageView>,
    pub current_stage: Option<PipelineStage>,
    pub current_operation: Option<String>,
    pub is_complete: bool,
    pub has_errors: bool,
}

impl PipelineView {
    pub fn stage(&self, stage: PipelineStage) -> Option<&StageView> {
        self.stages.iter().find(|view| view.stage == stage)
    }
}

pub fn derive_pipeline_view(
    document: &Document,
    chunks: &[SilverChunk],
    distributions: &[GoldDistribution],
) -> PipelineView {
    let mut stages = Vec::with_capacity(PipelineStage::ORDER.len());
    stages.push(bronze_stage(document));
    stages.push(silver_stage(document, chunks));
    for layer in GoldLayer::ALL {
        stages.push(gold_stage(layer, distributions));
    }

    let current = stages
        .iter()
        .find(|view| view.status == StageStatus::Processing)
        .map(|view| view.stage);
    let current_operation =
        current.map(|stage| describe_operation(stage, document, chunks, distributions));

    PipelineView {
        is_complete: stages.iter().all(|view| view.status.is_settled()),
        has_errors: stages.iter().any(|view| view.status == StageStatus::Failed),
        current_stage: current,
        current_operation,
        stages,
    }
}

fn bronze_stage(document: &Document) -> StageView {
    let stage = PipelineStage::Bronze;
    if document.bronze_complete() {
        StageView::new(stage, StageStatus::Completed)
            .progress(100)
            .started(Some(document.uploaded_at))
            .completed(document.bronze_processed_at)
    } else if document.embedding_state() == ProcessingStatus::Processing {
        StageView::new(stage, StageStatus::Processing)
            .progress(BRONZE_IN_PROGRESS_PERCENT)
            .started(Some(document.uploaded_at))
    } else {
        StageView::new(stage, StageStatus::Pending)
    }
}

fn silver_stage(document: &Document, chunks: &[SilverChunk]) -> StageView {
    let stage = PipelineStage::Silver;
    if !document.bronze_complete() {
        return StageView::new(stage, StageStatus::Pending);
    }
    if chunks.is_empty() {
        return StageView::new(stage, StageStatus::Processing)
            .progress(0)
            .started(document.bronze_processed_at);
    }

    let started_at = chunks.iter().map(|chunk| chunk.created_at).min();
    let completed = chunks
        .iter()
        .filter(|chunk| chunk.status() == ProcessingStatus::Completed)
        .count();
    let progress = percent(completed, chunks.len());

    let first_failure = chunks
        .iter()
        .filter(|chunk| chunk.status() == ProcessingStatus::Failed)
        .min_by_key(|chunk| chunk.chunk_index);
    if let Some(failed) = first_failure {
        let message = failed
            .error_message
            .clone()
            .unwrap_or_else(|| format!("chunk {} failed processing", failed.chunk_index));
        return StageView::new(stage, StageStatus::Failed)
            .progress(progress)
            .error(message)
            .started(started_at);
    }

    if progress == 100 {
        let finished_at = document
            .silver_processed_at
            .or_else(|| chunks.iter().map(|chunk| chunk.updated_at).max());
        StageView::new(stage, StageStatus::Completed)
            .progress(100)
            .started(started_at)
            .completed(finished_at)
    } else {
        StageView::new(stage, StageStatus::Processing)
            .progress(progress)
            .started(started_at)
    }
}

fn gold_stage(layer: GoldLayer, distributions: &[GoldDistribution]) -> StageView {
    let stage = PipelineStage::for_layer(layer);
    let counts = LayerCounts::tally(distributions, layer);
    let total = counts.total();

    if total == 0 {
        return StageView::new(stage, StageStatus::Pending);
    }
    if counts.skipped == total {
        return StageView::new(stage, StageStatus::Skipped);
    }

    let started_at = distributions
        .iter()
        .filter(|distribution| distribution.layer_status(layer) != LayerStatus::Skipped)
        .map(|distribution| distribution.created_at)
        .min();
    let progress = percent(counts.completed, total);

    if counts.failed > 0 {
        StageView::new(stage, StageStatus::Failed)
            .progress(progress)
            .error(format!("{} chunks failed distribution", counts.failed))
            .started(started_at)
    } else if counts.pending > 0 {
        StageView::new(stage, StageStatus::Processing)
            .progress(progress)
            .started(started_at)
    } else {
        let finished_at = distributions
            .iter()
            .filter_map(|distribution| distribution.layer(layer).distributed_at)
            .max();
        StageView::new(stage, StageStatus::Completed)
            .progress(100)
            .started(started_at)
            .completed(finished_at)
    }
}

fn describe_operation(
    stage: PipelineStage,
    document: &Document,
    chunks: &[SilverChunk],
    distributions: &[GoldDistribution],
) -> String {
    match stage.gold_layer() {
        Some(layer) => {
            let counts = LayerCounts::tally(distributions, layer);
            format!(
                "Distributing to {} ({}/{} chunks distributed)",
                layer.destination(),
                counts.completed,
                counts.total() - counts.skipped
            )
        }
        None if stage == PipelineStage::Bronze => {
            format!("Extracting text from {}", document.original_filename)
        }
        None => format!("Chunking content ({} chunks processed)", chunks.len()),
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

pub fn utc(at: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(at, Utc)
}
