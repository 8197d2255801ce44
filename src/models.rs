use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;
use crate::status::{parse_target_layers, GoldLayer, LayerStatus, ProcessingStatus};

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_categories)]
pub struct DocumentCategory {
    pub id: Uuid,
    pub name: String,
    pub target_gold_layers: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl DocumentCategory {
    pub fn target_layers(&self) -> Vec<GoldLayer> {
        parse_target_layers(&self.target_gold_layers)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_categories)]
pub struct NewDocumentCategory {
    pub id: Uuid,
    pub name: String,
    pub target_gold_layers: Vec<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(DocumentCategory, foreign_key = document_category_id))]
pub struct Document {
    pub id: Uuid,
    pub document_type_id: Option<Uuid>,
    pub document_category_id: Option<Uuid>,
    pub original_filename: String,
    pub file_key: String,
    pub file_size: i64,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub bronze_processed_at: Option<NaiveDateTime>,
    pub bronze_metadata: serde_json::Value,
    pub embedding_status: String,
    pub silver_processed_at: Option<NaiveDateTime>,
    pub silver_chunk_count: i32,
    pub gold_distribution_status: String,
    pub uploaded_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    pub fn bronze_complete(&self) -> bool {
        self.bronze_processed_at.is_some()
    }

    pub fn embedding_state(&self) -> ProcessingStatus {
        ProcessingStatus::from_column(&self.embedding_status)
    }

    pub fn gold_state(&self) -> ProcessingStatus {
        ProcessingStatus::from_column(&self.gold_distribution_status)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub document_type_id: Option<Uuid>,
    pub document_category_id: Option<Uuid>,
    pub original_filename: String,
    pub file_key: String,
    pub file_size: i64,
    pub mime_type: String,
    pub bronze_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub normalized_value: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = silver_chunks)]
#[diesel(belongs_to(Document))]
pub struct SilverChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub token_count: i32,
    pub page_number: Option<i32>,
    pub has_table: bool,
    pub has_image: bool,
    pub section_hierarchy: Vec<String>,
    pub extracted_entities: serde_json::Value,
    pub processing_status: String,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SilverChunk {
    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus::from_column(&self.processing_status)
    }

    pub fn entities(&self) -> Vec<ExtractedEntity> {
        serde_json::from_value(self.extracted_entities.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = silver_chunks)]
pub struct NewSilverChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub token_count: i32,
    pub page_number: Option<i32>,
    pub has_table: bool,
    pub has_image: bool,
    pub section_hierarchy: Vec<String>,
    pub extracted_entities: serde_json::Value,
    pub processing_status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = gold_distributions)]
#[diesel(belongs_to(Document))]
#[diesel(belongs_to(SilverChunk, foreign_key = silver_chunk_id))]
pub struct GoldDistribution {
    pub id: Uuid,
    pub silver_chunk_id: Uuid,
    pub document_id: Uuid,
    pub gold_a_status: String,
    pub gold_a_record_id: Option<String>,
    pub gold_a_distributed_at: Option<NaiveDateTime>,
    pub gold_a_error: Option<String>,
    pub gold_b_status: String,
    pub gold_b_node_id: Option<String>,
    pub gold_b_distributed_at: Option<NaiveDateTime>,
    pub gold_b_error: Option<String>,
    pub gold_c_status: String,
    pub gold_c_vector_id: Option<String>,
    pub gold_c_distributed_at: Option<NaiveDateTime>,
    pub gold_c_error: Option<String>,
    pub distribution_metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerRecord<'a> {
    pub status: LayerStatus,
    pub destination_id: Option<&'a str>,
    pub distributed_at: Option<NaiveDateTime>,
    pub error: Option<&'a str>,
}

impl GoldDistribution {
    pub fn layer(&self, layer: GoldLayer) -> LayerRecord<'_> {
        let (status, destination_id, distributed_at, error) = match layer {
            GoldLayer::Analytics => (
                &self.gold_a_status,
                &self.gold_a_record_id,
                self.gold_a_distributed_at,
                &self.gold_a_error,
            ),
            GoldLayer::Graph => (
                &self.gold_b_status,
                &self.gold_b_node_id,
                self.gold_b_distributed_at,
                &self.gold_b_error,
            ),
            GoldLayer::Vector => (
                &self.gold_c_status,
                &self.gold_c_vector_id,
                self.gold_c_distributed_at,
                &self.gold_c_error,
            ),
        };

        LayerRecord {
            status: LayerStatus::from_column(status),
            destination_id: destination_id.as_deref(),
            distributed_at,
            error: error.as_deref(),
        }
    }

    pub fn layer_status(&self, layer: GoldLayer) -> LayerStatus {
        self.layer(layer).status
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = gold_distributions)]
pub struct NewGoldDistribution {
    pub id: Uuid,
    pub silver_chunk_id: Uuid,
    pub document_id: Uuid,
    pub gold_a_status: String,
    pub gold_b_status: String,
    pub gold_c_status: String,
    pub distribution_metadata: serde_json::Value,
}

impl NewGoldDistribution {
    pub fn for_chunk(chunk: &SilverChunk, targets: &[GoldLayer]) -> Self {
        let initial = |layer: GoldLayer| {
            if targets.contains(&layer) {
                LayerStatus::Pending.as_str().to_string()
            } else {
                LayerStatus::Skipped.as_str().to_string()
            }
        };

        Self {
            id: Uuid::new_v4(),
            silver_chunk_id: chunk.id,
            document_id: chunk.document_id,
            gold_a_status: initial(GoldLayer::Analytics),
            gold_b_status: initial(GoldLayer::Graph),
            gold_c_status: initial(GoldLayer::Vector),
            distribution_metadata: serde_json::json!({
                "target_gold_layers": targets.iter().map(|layer| layer.as_str()).collect::<Vec<_>>(),
            }),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
