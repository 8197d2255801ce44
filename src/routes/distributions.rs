use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::GoldDistribution;
use crate::pipeline::{
    ledger::{self, LayerOutcome, LayerTransition},
    view::utc,
};
use crate::state::AppState;
use crate::status::{GoldLayer, LayerStatus};

#[derive(Serialize)]
pub struct LayerResponse {
    pub status: LayerStatus,
    pub destination_id: Option<String>,
    pub distributed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct DistributionResponse {
    pub id: Uuid,
    pub silver_chunk_id: Uuid,
    pub document_id: Uuid,
    pub gold_a: LayerResponse,
    pub gold_b: LayerResponse,
    pub gold_c: LayerResponse,
    pub distribution_metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&GoldDistribution> for DistributionResponse {
    fn from(distribution: &GoldDistribution) -> Self {
        let layer = |layer: GoldLayer| {
            let record = distribution.layer(layer);
            LayerResponse {
                status: record.status,
                destination_id: record.destination_id.map(str::to_string),
                distributed_at: record.distributed_at.map(utc),
                error: record.error.map(str::to_string),
            }
        };

        Self {
            id: distribution.id,
            silver_chunk_id: distribution.silver_chunk_id,
            document_id: distribution.document_id,
            gold_a: layer(GoldLayer::Analytics),
            gold_b: layer(GoldLayer::Graph),
            gold_c: layer(GoldLayer::Vector),
            distribution_metadata: distribution.distribution_metadata.clone(),
            created_at: utc(distribution.created_at),
            updated_at: utc(distribution.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub transition: LayerTransition,
    pub distribution: DistributionResponse,
}

fn parse_layer(raw: &str) -> AppResult<GoldLayer> {
    GoldLayer::parse(raw).ok_or_else(|| AppError::bad_request(format!("unknown gold layer '{raw}'")))
}

pub async fn begin_dispatch(
    State(state): State<AppState>,
    Path((distribution_id, layer)): Path<(Uuid, String)>,
) -> AppResult<Json<TransitionResponse>> {
    let layer = parse_layer(&layer)?;
    let mut conn = state.db()?;
    let transition = ledger::begin_layer_dispatch(&mut conn, distribution_id, layer)?;
    let distribution = ledger::find_distribution(&mut conn, distribution_id)?;
    Ok(Json(TransitionResponse {
        transition,
        distribution: (&distribution).into(),
    }))
}

pub async fn record_result(
    State(state): State<AppState>,
    Path((distribution_id, layer)): Path<(Uuid, String)>,
    Json(outcome): Json<LayerOutcome>,
) -> AppResult<Json<TransitionResponse>> {
    let layer = parse_layer(&layer)?;
    let mut conn = state.db()?;
    let transition = ledger::record_layer_result(&mut conn, distribution_id, layer, &outcome)?;
    let distribution = ledger::find_distribution(&mut conn, distribution_id)?;
    Ok(Json(TransitionResponse {
        transition,
        distribution: (&distribution).into(),
    }))
}
