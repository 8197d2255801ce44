use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use thiserror::Error;
use tokio::task;
use tracing::{debug, error, warn};

use crate::{
    jobs::{dispatch_job_type, DispatchPayload},
    models::{Document, Job, SilverChunk},
    pipeline::{
        find_document,
        ledger::{
            begin_layer_dispatch, record_layer_result, validate_destination_id, LayerOutcome,
            LayerTransition,
        },
        LedgerError,
    },
    schema::silver_chunks,
    state::AppState,
    status::GoldLayer,
};

use super::{sink::GoldSink, JobExecution, JobHandler};

const LEDGER_RETRY_DELAY: Duration = Duration::from_secs(30);

pub struct DistributeGoldLayerJob {
    layer: GoldLayer,
    sink: Arc<dyn GoldSink>,
}

impl DistributeGoldLayerJob {
    pub fn new(layer: GoldLayer, sink: Arc<dyn GoldSink>) -> Self {
        Self { layer, sink }
    }
}

struct DispatchContext {
    transition: LayerTransition,
    document: Document,
    chunk: SilverChunk,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("database pool error: {0}")]
    Pool(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn begin(state: Arc<AppState>, payload: &DispatchPayload) -> Result<DispatchContext, DispatchError> {
    let mut conn = state
        .pool
        .get()
        .map_err(|err| DispatchError::Pool(err.to_string()))?;

    let transition = begin_layer_dispatch(&mut conn, payload.distribution_id, payload.layer)?;
    let document = find_document(&mut conn, payload.document_id)?;
    let chunk = silver_chunks::table
        .find(payload.silver_chunk_id)
        .first::<SilverChunk>(&mut conn)
        .optional()
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::ChunkNotFound(payload.silver_chunk_id))?;

    Ok(DispatchContext {
        transition,
        document,
        chunk,
    })
}

fn record(
    state: Arc<AppState>,
    payload: &DispatchPayload,
    outcome: &LayerOutcome,
) -> Result<LayerTransition, DispatchError> {
    let mut conn = state
        .pool
        .get()
        .map_err(|err| DispatchError::Pool(err.to_string()))?;
    Ok(record_layer_result(
        &mut conn,
        payload.distribution_id,
        payload.layer,
        outcome,
    )?)
}

fn ledger_failure(err: DispatchError) -> JobExecution {
    match err {
        DispatchError::Ledger(
            LedgerError::DocumentNotFound(_)
            | LedgerError::ChunkNotFound(_)
            | LedgerError::DistributionNotFound(_)
            | LedgerError::ConflictingDestinationId { .. }
            | LedgerError::Invalid(_),
        ) => JobExecution::Failed {
            error: err.to_string(),
        },
        other => JobExecution::Retry {
            delay: LEDGER_RETRY_DELAY,
            error: other.to_string(),
        },
    }
}

fn sink_outcome(result: anyhow::Result<String>) -> LayerOutcome {
    match result {
        Ok(destination_id) => match validate_destination_id(&destination_id) {
            Ok(()) => LayerOutcome::Success {
                destination_id,
                distributed_at: None,
            },
            Err(err) => LayerOutcome::Failure {
                error: format!("sink returned an unusable identifier: {err}"),
            },
        },
        Err(err) => LayerOutcome::Failure {
            error: format!("{err:#}"),
        },
    }
}

#[async_trait]
impl JobHandler for DistributeGoldLayerJob {
    fn job_type(&self) -> &'static str {
        dispatch_job_type(self.layer)
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: DispatchPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid dispatch payload: {err}"),
                }
            }
        };
        if payload.layer != self.layer {
            return JobExecution::Failed {
                error: format!(
                    "payload targets {} but this queue serves {}",
                    payload.layer, self.layer
                ),
            };
        }

        let begin_state = state.clone();
        let begin_payload = payload.clone();
        let context = match task::spawn_blocking(move || begin(begin_state, &begin_payload)).await {
            Ok(Ok(context)) => context,
            Ok(Err(err)) => return ledger_failure(err),
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "dispatch task panicked");
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        if let LayerTransition::Rejected { status, reason } = &context.transition {
            debug!(
                job_id = %job.id,
                distribution_id = %payload.distribution_id,
                layer = %self.layer,
                %status,
                %reason,
                "layer not dispatchable; dropping job"
            );
            return JobExecution::Success;
        }

        let outcome = sink_outcome(self.sink.write(&context.document, &context.chunk).await);
        if let LayerOutcome::Failure { error } = &outcome {
            warn!(
                job_id = %job.id,
                distribution_id = %payload.distribution_id,
                layer = %self.layer,
                %error,
                "sink write failed"
            );
        }

        let record_payload = payload.clone();
        match task::spawn_blocking(move || record(state, &record_payload, &outcome)).await {
            Ok(Ok(_)) => JobExecution::Success,
            Ok(Err(err)) => ledger_failure(err),
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "dispatch task panicked");
                JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}
