//! Per-layer state of the Gold fan-out.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::{enqueue_dispatch, DispatchPayload};
use crate::models::{Document, GoldDistribution, LayerRecord, NewGoldDistribution, SilverChunk};
use crate::schema::gold_distributions;
use crate::status::{GoldLayer, LayerStatus};

use super::categories::target_layers_for;
use super::{
    ensure_max_len, lock_document, refresh_document_aggregates, LedgerError, LedgerResult,
    MAX_DESTINATION_ID_LEN,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LayerOutcome {
    Success {
        destination_id: String,
        #[serde(default)]
        distributed_at: Option<NaiveDateTime>,
    },
    Failure {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LayerTransition {
    Applied { from: LayerStatus, to: LayerStatus },
    Unchanged { status: LayerStatus },
    Rejected { status: LayerStatus, reason: String },
}

impl LayerTransition {
    pub fn is_applied(&self) -> bool {
        matches!(self, LayerTransition::Applied { .. })
    }

    fn rejected(status: LayerStatus, reason: impl Into<String>) -> Self {
        LayerTransition::Rejected {
            status,
            reason: reason.into(),
        }
    }
}

pub fn plan_dispatch(current: LayerStatus) -> LayerTransition {
    match current {
        LayerStatus::Pending => LayerTransition::Applied {
            from: LayerStatus::Pending,
            to: LayerStatus::Processing,
        },
        LayerStatus::Processing => LayerTransition::Unchanged {
            status: LayerStatus::Processing,
        },
        LayerStatus::Skipped => {
            LayerTransition::rejected(current, "layer is not targeted by the document category")
        }
        LayerStatus::Completed => LayerTransition::rejected(current, "layer already completed"),
        LayerStatus::Failed => {
            LayerTransition::rejected(current, "layer failed; retry the document first")
        }
    }
}

pub fn validate_destination_id(destination_id: &str) -> LedgerResult<()> {
    if destination_id.trim().is_empty() {
        return Err(LedgerError::Invalid(
            "destination_id must not be empty".into(),
        ));
    }
    ensure_max_len("destination_id", destination_id, MAX_DESTINATION_ID_LEN)
}

pub fn plan_result(
    distribution_id: Uuid,
    layer: GoldLayer,
    current: LayerRecord<'_>,
    outcome: &LayerOutcome,
) -> LedgerResult<LayerTransition> {
    if let LayerOutcome::Success { destination_id, .. } = outcome {
        validate_destination_id(destination_id)?;
    }

    let transition = match (current.status, outcome) {
        (LayerStatus::Skipped, _) => LayerTransition::rejected(
            LayerStatus::Skipped,
            "layer is not targeted by the document category",
        ),
        (LayerStatus::Completed, LayerOutcome::Success { destination_id, .. }) => {
            match current.destination_id {
                Some(existing) if existing == destination_id.as_str() => LayerTransition::Unchanged {
                    status: LayerStatus::Completed,
                },
                existing => {
                    return Err(LedgerError::ConflictingDestinationId {
                        distribution_id,
                        layer,
                        existing: existing.unwrap_or_default().to_string(),
                        attempted: destination_id.clone(),
                    })
                }
            }
        }
        (LayerStatus::Completed, LayerOutcome::Failure { .. }) => {
            LayerTransition::rejected(LayerStatus::Completed, "layer already completed")
        }
        (LayerStatus::Failed, LayerOutcome::Failure { .. }) => LayerTransition::Unchanged {
            status: LayerStatus::Failed,
        },
        (LayerStatus::Failed, LayerOutcome::Success { .. }) => {
            LayerTransition::rejected(LayerStatus::Failed, "layer failed; retry the document first")
        }
        (from @ (LayerStatus::Pending | LayerStatus::Processing), outcome) => {
            let to = match outcome {
                LayerOutcome::Success { .. } => LayerStatus::Completed,
                LayerOutcome::Failure { .. } => LayerStatus::Failed,
            };
            LayerTransition::Applied { from, to }
        }
    };

    Ok(transition)
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = gold_distributions)]
pub(crate) struct LayerChangeset<'a> {
    gold_a_status: Option<&'a str>,
    gold_a_record_id: Option<Option<&'a str>>,
    gold_a_distributed_at: Option<Option<NaiveDateTime>>,
    gold_a_error: Option<Option<&'a str>>,
    gold_b_status: Option<&'a str>,
    gold_b_node_id: Option<Option<&'a str>>,
    gold_b_distributed_at: Option<Option<NaiveDateTime>>,
    gold_b_error: Option<Option<&'a str>>,
    gold_c_status: Option<&'a str>,
    gold_c_vector_id: Option<Option<&'a str>>,
    gold_c_distributed_at: Option<Option<NaiveDateTime>>,
    gold_c_error: Option<Option<&'a str>>,
    updated_at: Option<NaiveDateTime>,
}

impl<'a> LayerChangeset<'a> {
    pub(crate) fn status(layer: GoldLayer, status: LayerStatus, now: NaiveDateTime) -> Self {
        let mut changes = Self {
            updated_at: Some(now),
            ..Self::default()
        };
        match layer {
            GoldLayer::Analytics => changes.gold_a_status = Some(status.as_str()),
            GoldLayer::Graph => changes.gold_b_status = Some(status.as_str()),
            GoldLayer::Vector => changes.gold_c_status = Some(status.as_str()),
        }
        changes
    }

    pub(crate) fn full(
        layer: GoldLayer,
        status: LayerStatus,
        destination_id: Option<&'a str>,
        distributed_at: Option<NaiveDateTime>,
        error: Option<&'a str>,
        now: NaiveDateTime,
    ) -> Self {
        let mut changes = Self::status(layer, status, now);
        match layer {
            GoldLayer::Analytics => {
                changes.gold_a_record_id = Some(destination_id);
                changes.gold_a_distributed_at = Some(distributed_at);
                changes.gold_a_error = Some(error);
            }
            GoldLayer::Graph => {
                changes.gold_b_node_id = Some(destination_id);
                changes.gold_b_distributed_at = Some(distributed_at);
                changes.gold_b_error = Some(error);
            }
            GoldLayer::Vector => {
                changes.gold_c_vector_id = Some(destination_id);
                changes.gold_c_distributed_at = Some(distributed_at);
                changes.gold_c_error = Some(error);
            }
        }
        changes
    }
}

/// Applies `changes` only while the layer is still in one of `expected`.
pub(crate) fn update_layer_where(
    conn: &mut PgConnection,
    distribution_id: Uuid,
    layer: GoldLayer,
    expected: &[&str],
    changes: &LayerChangeset<'_>,
) -> QueryResult<usize> {
    let row = gold_distributions::table.find(distribution_id);
    match layer {
        GoldLayer::Analytics => diesel::update(row.filter(gold_distributions::gold_a_status.eq_any(expected)))
            .set(changes)
            .execute(conn),
        GoldLayer::Graph => diesel::update(row.filter(gold_distributions::gold_b_status.eq_any(expected)))
            .set(changes)
            .execute(conn),
        GoldLayer::Vector => diesel::update(row.filter(gold_distributions::gold_c_status.eq_any(expected)))
            .set(changes)
            .execute(conn),
    }
}

pub fn find_distribution(
    conn: &mut PgConnection,
    distribution_id: Uuid,
) -> LedgerResult<GoldDistribution> {
    gold_distributions::table
        .find(distribution_id)
        .first::<GoldDistribution>(conn)
        .optional()?
        .ok_or(LedgerError::DistributionNotFound(distribution_id))
}

fn lock_distribution(
    conn: &mut PgConnection,
    distribution_id: Uuid,
) -> LedgerResult<GoldDistribution> {
    let document_id = find_distribution(conn, distribution_id)?.document_id;
    lock_document(conn, document_id)?;
    gold_distributions::table
        .find(distribution_id)
        .for_update()
        .first::<GoldDistribution>(conn)
        .optional()?
        .ok_or(LedgerError::DistributionNotFound(distribution_id))
}

pub fn begin_layer_dispatch(
    conn: &mut PgConnection,
    distribution_id: Uuid,
    layer: GoldLayer,
) -> LedgerResult<LayerTransition> {
    conn.transaction(|conn| {
        let distribution = lock_distribution(conn, distribution_id)?;
        let transition = plan_dispatch(distribution.layer_status(layer));

        if transition.is_applied() {
            let now = Utc::now().naive_utc();
            let changes = LayerChangeset::status(layer, LayerStatus::Processing, now);
            update_layer_where(
                conn,
                distribution_id,
                layer,
                &[LayerStatus::Pending.as_str()],
                &changes,
            )?;
            refresh_document_aggregates(conn, distribution.document_id)?;
            info!(
                document_id = %distribution.document_id,
                distribution_id = %distribution_id,
                %layer,
                "gold layer dispatch started"
            );
        }

        Ok(transition)
    })
}

pub fn record_layer_result(
    conn: &mut PgConnection,
    distribution_id: Uuid,
    layer: GoldLayer,
    outcome: &LayerOutcome,
) -> LedgerResult<LayerTransition> {
    let result = conn.transaction(|conn| {
        let distribution = lock_distribution(conn, distribution_id)?;
        let current = distribution.layer(layer);
        let transition = plan_result(distribution_id, layer, current, outcome)?;

        if let LayerTransition::Applied { from, to } = &transition {
            let now = Utc::now().naive_utc();
            let changes = match outcome {
                LayerOutcome::Success {
                    destination_id,
                    distributed_at,
                } => LayerChangeset::full(
                    layer,
                    LayerStatus::Completed,
                    Some(destination_id.as_str()),
                    Some(distributed_at.unwrap_or(now)),
                    None,
                    now,
                ),
                LayerOutcome::Failure { error } => LayerChangeset::full(
                    layer,
                    LayerStatus::Failed,
                    None,
                    None,
                    Some(error.as_str()),
                    now,
                ),
            };
            update_layer_where(conn, distribution_id, layer, &[from.as_str()], &changes)?;
            refresh_document_aggregates(conn, distribution.document_id)?;

            match outcome {
                LayerOutcome::Success { destination_id, .. } => info!(
                    document_id = %distribution.document_id,
                    distribution_id = %distribution_id,
                    %layer,
                    %destination_id,
                    "gold layer completed"
                ),
                LayerOutcome::Failure { error } => warn!(
                    document_id = %distribution.document_id,
                    distribution_id = %distribution_id,
                    %layer,
                    %error,
                    from = %from,
                    to = %to,
                    "gold layer failed"
                ),
            }
        }

        Ok(transition)
    });

    if let Err(err) = &result {
        if matches!(err, LedgerError::ConflictingDestinationId { .. }) {
            error!(
                distribution_id = %distribution_id,
                %layer,
                error = %err,
                "duplicate gold write rejected; destination is not idempotent"
            );
        }
    }

    result
}

pub(crate) fn ensure_distribution(
    conn: &mut PgConnection,
    document: &Document,
    chunk: &SilverChunk,
) -> LedgerResult<Option<GoldDistribution>> {
    let targets = target_layers_for(conn, document)?;
    let new_distribution = NewGoldDistribution::for_chunk(chunk, &targets);

    let inserted = diesel::insert_into(gold_distributions::table)
        .values(&new_distribution)
        .on_conflict(gold_distributions::silver_chunk_id)
        .do_nothing()
        .execute(conn)?;
    if inserted == 0 {
        return Ok(None);
    }

    for layer in &targets {
        enqueue_dispatch(
            conn,
            &DispatchPayload {
                document_id: document.id,
                distribution_id: new_distribution.id,
                silver_chunk_id: chunk.id,
                layer: *layer,
            },
        )?;
    }

    info!(
        document_id = %document.id,
        silver_chunk_id = %chunk.id,
        distribution_id = %new_distribution.id,
        targets = ?targets,
        "gold distribution created"
    );

    find_distribution(conn, new_distribution.id).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: LayerStatus, destination_id: Option<&str>) -> LayerRecord<'_> {
        LayerRecord {
            status,
            destination_id,
            distributed_at: None,
            error: None,
        }
    }

    fn success(id: &str) -> LayerOutcome {
        LayerOutcome::Success {
            destination_id: id.to_string(),
            distributed_at: None,
        }
    }

    fn failure() -> LayerOutcome {
        LayerOutcome::Failure {
            error: "sink timeout".to_string(),
        }
    }

    #[test]
    fn dispatch_moves_pending_to_processing_once() {
        assert_eq!(
            plan_dispatch(LayerStatus::Pending),
            LayerTransition::Applied {
                from: LayerStatus::Pending,
                to: LayerStatus::Processing
            }
        );
        assert_eq!(
            plan_dispatch(LayerStatus::Processing),
            LayerTransition::Unchanged {
                status: LayerStatus::Processing
            }
        );
        for status in [LayerStatus::Skipped, LayerStatus::Completed, LayerStatus::Failed] {
            assert!(matches!(
                plan_dispatch(status),
                LayerTransition::Rejected { .. }
            ));
        }
    }

    #[test]
    fn success_completes_pending_or_processing_layers() {
        let id = Uuid::new_v4();
        for from in [LayerStatus::Pending, LayerStatus::Processing] {
            let transition =
                plan_result(id, GoldLayer::Graph, record(from, None), &success("node-1")).unwrap();
            assert_eq!(
                transition,
                LayerTransition::Applied {
                    from,
                    to: LayerStatus::Completed
                }
            );
        }
    }

    #[test]
    fn failure_fails_processing_layer() {
        let transition = plan_result(
            Uuid::new_v4(),
            GoldLayer::Vector,
            record(LayerStatus::Processing, None),
            &failure(),
        )
        .unwrap();
        assert_eq!(
            transition,
            LayerTransition::Applied {
                from: LayerStatus::Processing,
                to: LayerStatus::Failed
            }
        );
    }

    #[test]
    fn duplicate_success_with_same_identifier_is_a_no_op() {
        let transition = plan_result(
            Uuid::new_v4(),
            GoldLayer::Analytics,
            record(LayerStatus::Completed, Some("rec-9")),
            &success("rec-9"),
        )
        .unwrap();
        assert_eq!(
            transition,
            LayerTransition::Unchanged {
                status: LayerStatus::Completed
            }
        );
    }

    #[test]
    fn conflicting_identifier_is_a_hard_error() {
        let err = plan_result(
            Uuid::new_v4(),
            GoldLayer::Analytics,
            record(LayerStatus::Completed, Some("rec-9")),
            &success("rec-10"),
        )
        .unwrap_err();
        match err {
            LedgerError::ConflictingDestinationId {
                existing,
                attempted,
                layer,
                ..
            } => {
                assert_eq!(existing, "rec-9");
                assert_eq!(attempted, "rec-10");
                assert_eq!(layer, GoldLayer::Analytics);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn skipped_layers_reject_every_outcome() {
        for outcome in [success("x"), failure()] {
            let transition = plan_result(
                Uuid::new_v4(),
                GoldLayer::Vector,
                record(LayerStatus::Skipped, None),
                &outcome,
            )
            .unwrap();
            assert!(matches!(
                transition,
                LayerTransition::Rejected {
                    status: LayerStatus::Skipped,
                    ..
                }
            ));
        }
    }

    #[test]
    fn failed_layers_need_a_retry_before_success() {
        let transition = plan_result(
            Uuid::new_v4(),
            GoldLayer::Graph,
            record(LayerStatus::Failed, None),
            &success("node-2"),
        )
        .unwrap();
        assert!(matches!(transition, LayerTransition::Rejected { .. }));

        let repeated = plan_result(
            Uuid::new_v4(),
            GoldLayer::Graph,
            record(LayerStatus::Failed, None),
            &failure(),
        )
        .unwrap();
        assert_eq!(
            repeated,
            LayerTransition::Unchanged {
                status: LayerStatus::Failed
            }
        );
    }

    #[test]
    fn empty_identifier_is_invalid() {
        let err = plan_result(
            Uuid::new_v4(),
            GoldLayer::Analytics,
            record(LayerStatus::Processing, None),
            &success("  "),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(_)));
    }

    #[test]
    fn identifier_longer_than_column_is_invalid() {
        let at_limit = "v".repeat(MAX_DESTINATION_ID_LEN);
        assert!(plan_result(
            Uuid::new_v4(),
            GoldLayer::Vector,
            record(LayerStatus::Processing, None),
            &success(&at_limit),
        )
        .is_ok());

        let err = plan_result(
            Uuid::new_v4(),
            GoldLayer::Vector,
            record(LayerStatus::Processing, None),
            &success(&"v".repeat(MAX_DESTINATION_ID_LEN + 1)),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(message) if message.contains("destination_id")));
    }

    #[test]
    fn outcome_deserializes_from_tagged_json() {
        let outcome: LayerOutcome = serde_json::from_value(serde_json::json!({
            "outcome": "success",
            "destination_id": "vec-1"
        }))
        .unwrap();
        assert_eq!(outcome, success("vec-1"));

        let outcome: LayerOutcome = serde_json::from_value(serde_json::json!({
            "outcome": "failure",
            "error": "sink timeout"
        }))
        .unwrap();
        assert_eq!(outcome, failure());
    }
}
