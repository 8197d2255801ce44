use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{Document, GoldDistribution, SilverChunk};
use crate::status::{GoldLayer, LayerStatus, ProcessingStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerCounts {
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl LayerCounts {
    pub fn tally(distributions: &[GoldDistribution], layer: GoldLayer) -> Self {
        distributions
            .iter()
            .fold(Self::default(), |mut counts, distribution| {
                counts.record(distribution.layer_status(layer));
                counts
            })
    }

    pub fn record(&mut self, status: LayerStatus) {
        match status {
            LayerStatus::Completed => self.completed += 1,
            LayerStatus::Pending | LayerStatus::Processing => self.pending += 1,
            LayerStatus::Failed => self.failed += 1,
            LayerStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.pending + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub total: usize,
    pub gold_a: LayerCounts,
    pub gold_b: LayerCounts,
    pub gold_c: LayerCounts,
}

impl ProcessingStats {
    pub fn layer(&self, layer: GoldLayer) -> LayerCounts {
        match layer {
            GoldLayer::Analytics => self.gold_a,
            GoldLayer::Graph => self.gold_b,
            GoldLayer::Vector => self.gold_c,
        }
    }
}

pub fn processing_stats(distributions: &[GoldDistribution]) -> ProcessingStats {
    ProcessingStats {
        total: distributions.len(),
        gold_a: LayerCounts::tally(distributions, GoldLayer::Analytics),
        gold_b: LayerCounts::tally(distributions, GoldLayer::Graph),
        gold_c: LayerCounts::tally(distributions, GoldLayer::Vector),
    }
}

/// Any failure wins, then any unfinished targeted layer. No rows reads as `pending`.
pub fn gold_distribution_status(distributions: &[GoldDistribution]) -> ProcessingStatus {
    if distributions.is_empty() {
        return ProcessingStatus::Pending;
    }

    let statuses = || {
        distributions.iter().flat_map(|distribution| {
            GoldLayer::ALL
                .into_iter()
                .map(move |layer| distribution.layer_status(layer))
        })
    };

    if statuses().any(|status| status == LayerStatus::Failed) {
        ProcessingStatus::Failed
    } else if statuses().any(|status| !status.is_settled()) {
        ProcessingStatus::Processing
    } else {
        ProcessingStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentAggregates {
    pub embedding_status: ProcessingStatus,
    pub silver_chunk_count: i32,
    pub silver_processed_at: Option<NaiveDateTime>,
    pub gold_distribution_status: ProcessingStatus,
}

impl DocumentAggregates {
    pub fn matches(&self, document: &Document) -> bool {
        document.embedding_state() == self.embedding_status
            && document.silver_chunk_count == self.silver_chunk_count
            && document.silver_processed_at == self.silver_processed_at
            && document.gold_state() == self.gold_distribution_status
    }
}

pub fn compute_document_aggregates(
    document: &Document,
    chunks: &[SilverChunk],
    distributions: &[GoldDistribution],
    now: NaiveDateTime,
) -> DocumentAggregates {
    let all_completed =
        !chunks.is_empty() && chunks.iter().all(|chunk| chunk.status() == ProcessingStatus::Completed);

    let embedding_status = if chunks.is_empty() {
        document.embedding_state()
    } else if chunks
        .iter()
        .any(|chunk| chunk.status() == ProcessingStatus::Failed)
    {
        ProcessingStatus::Failed
    } else if all_completed {
        ProcessingStatus::Completed
    } else {
        ProcessingStatus::Processing
    };

    let silver_processed_at = if all_completed {
        Some(document.silver_processed_at.unwrap_or(now))
    } else {
        None
    };

    DocumentAggregates {
        embedding_status,
        silver_chunk_count: chunks.len() as i32,
        silver_processed_at,
        gold_distribution_status: gold_distribution_status(distributions),
    }
}
