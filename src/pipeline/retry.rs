use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::jobs::{enqueue_dispatch, DispatchPayload};
use crate::models::GoldDistribution;
use crate::schema::gold_distributions;
use crate::status::{GoldLayer, LayerStatus};

use super::ledger::{update_layer_where, LayerChangeset};
use super::{lock_document, refresh_document_aggregates, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequeuedLayer {
    pub distribution_id: Uuid,
    pub silver_chunk_id: Uuid,
    pub layer: GoldLayer,
}

pub fn failed_layers(distribution: &GoldDistribution) -> Vec<GoldLayer> {
    GoldLayer::ALL
        .into_iter()
        .filter(|layer| distribution.layer_status(*layer) == LayerStatus::Failed)
        .collect()
}

/// Resets every failed layer of the document to `pending` and enqueues a dispatch job for
/// each. Completed, skipped and in-flight layers are left alone. Returns `true` when at
/// least one layer was re-queued.
pub fn retry_failed_gold_distribution(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<bool> {
    let requeued = retry_failed_layers(conn, document_id)?;
    Ok(!requeued.is_empty())
}

pub fn retry_failed_layers(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<Vec<RequeuedLayer>> {
    conn.transaction(|conn| {
        lock_document(conn, document_id)?;

        let distributions = gold_distributions::table
            .filter(gold_distributions::document_id.eq(document_id))
            .order(gold_distributions::created_at.asc())
            .for_update()
            .load::<GoldDistribution>(conn)?;

        let now = Utc::now().naive_utc();
        let mut requeued = Vec::new();

        for distribution in &distributions {
            for layer in failed_layers(distribution) {
                let changes =
                    LayerChangeset::full(layer, LayerStatus::Pending, None, None, None, now);
                let updated = update_layer_where(
                    conn,
                    distribution.id,
                    layer,
                    &[LayerStatus::Failed.as_str()],
                    &changes,
                )?;
                if updated == 0 {
                    continue;
                }

                enqueue_dispatch(
                    conn,
                    &DispatchPayload {
                        document_id,
                        distribution_id: distribution.id,
                        silver_chunk_id: distribution.silver_chunk_id,
                        layer,
                    },
                )?;
                requeued.push(RequeuedLayer {
                    distribution_id: distribution.id,
                    silver_chunk_id: distribution.silver_chunk_id,
                    layer,
                });
            }
        }

        if !requeued.is_empty() {
            refresh_document_aggregates(conn, document_id)?;
            info!(
                document_id = %document_id,
                layers = requeued.len(),
                "failed gold layers re-queued"
            );
        }

        Ok(requeued)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::{chunk, distribution, extracted_document};
    use crate::status::LayerStatus::*;
    use crate::status::ProcessingStatus;

    #[test]
    fn only_failed_layers_are_selected() {
        let document = extracted_document();
        let chunk = chunk(&document, 0, ProcessingStatus::Completed);
        let distribution = distribution(&chunk, [Completed, Failed, Skipped]);
        assert_eq!(failed_layers(&distribution), vec![GoldLayer::Graph]);
    }

    #[test]
    fn nothing_selected_without_failures() {
        let document = extracted_document();
        let chunk = chunk(&document, 0, ProcessingStatus::Completed);
        let distribution = distribution(&chunk, [Processing, Pending, Completed]);
        assert!(failed_layers(&distribution).is_empty());
    }

    #[test]
    fn every_failed_layer_is_selected_in_layer_order() {
        let document = extracted_document();
        let chunk = chunk(&document, 0, ProcessingStatus::Completed);
        let distribution = distribution(&chunk, [Failed, Completed, Failed]);
        assert_eq!(
            failed_layers(&distribution),
            vec![GoldLayer::Analytics, GoldLayer::Vector]
        );
    }
}
