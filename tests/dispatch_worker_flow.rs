mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use common::{acquire_db_lock, TestApp};
use medallion::models::{Document, SilverChunk};
use medallion::status::GoldLayer;
use medallion::workers::{DistributeGoldLayerJob, GoldSink, JobHandler};
use medallion::Worker;
use serde_json::Value;
use uuid::Uuid;

struct FlakySink {
    failures_left: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakySink {
    fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(times),
            writes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GoldSink for FlakySink {
    async fn write(&self, _document: &Document, chunk: &SilverChunk) -> Result<String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("down"));
        }
        Ok(format!("rec-{}", chunk.id))
    }
}

struct OversizedIdSink;

#[async_trait]
impl GoldSink for OversizedIdSink {
    async fn write(&self, _document: &Document, _chunk: &SilverChunk) -> Result<String> {
        Ok("x".repeat(300))
    }
}

fn worker(app: &TestApp, layer: GoldLayer, sink: Arc<dyn GoldSink>) -> Worker {
    let handler: Arc<dyn JobHandler> = Arc::new(DistributeGoldLayerJob::new(layer, sink));
    Worker::new(
        Arc::new(app.state.clone()),
        vec![handler],
        Duration::from_millis(10),
    )
}

async fn pipeline(app: &TestApp, document_id: Uuid) -> Result<Value> {
    app.expect_json(
        Method::GET,
        &format!("/api/documents/{document_id}/pipeline"),
        None,
        StatusCode::OK,
    )
    .await
}

#[tokio::test]
async fn sink_failure_is_recorded_and_retry_redelivers() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let category = app.create_category("Analytics only", &["gold_a"]).await?;
    let document_id = app.register_document("uploads/ledger.pdf", Some(category)).await?;
    app.complete_bronze(document_id).await?;
    let chunk_id = app.add_chunk(document_id, 0, "completed").await?;

    let sink = FlakySink::failing(1);
    let worker = worker(&app, GoldLayer::Analytics, sink.clone());
    assert_eq!(worker.job_types(), vec!["distribute-gold-a"]);

    assert!(worker.tick().await?);
    assert!(!worker.tick().await?);

    let distributions = app.distributions(document_id).await?;
    assert_eq!(distributions[0]["gold_a"]["status"], "failed");
    assert_eq!(distributions[0]["gold_a"]["error"], "down");
    assert_eq!(distributions[0]["gold_b"]["status"], "skipped");

    let jobs = app.jobs_by_type("distribute-gold-a").await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, "succeeded");

    let view = pipeline(&app, document_id).await?;
    assert_eq!(view["has_errors"], true);
    assert_eq!(view["is_complete"], false);

    let requeued: Value = app
        .expect_json(
            Method::POST,
            &format!("/api/documents/{document_id}/retry-gold"),
            None,
            StatusCode::OK,
        )
        .await?;
    assert_eq!(requeued["requeued"], true);
    assert_eq!(app.jobs_by_type("distribute-gold-a").await?.len(), 2);

    assert!(worker.tick().await?);
    assert_eq!(sink.writes.load(Ordering::SeqCst), 2);

    let distributions = app.distributions(document_id).await?;
    assert_eq!(distributions[0]["gold_a"]["status"], "completed");
    assert_eq!(
        distributions[0]["gold_a"]["destination_id"],
        format!("rec-{chunk_id}")
    );
    assert!(distributions[0]["gold_a"]["error"].is_null());

    let view = pipeline(&app, document_id).await?;
    assert_eq!(view["is_complete"], true);
    assert_eq!(view["has_errors"], false);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unusable_identifier_fails_the_layer_without_retrying() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let category = app.create_category("Vectors", &["gold_c"]).await?;
    let document_id = app.register_document("uploads/embed.pdf", Some(category)).await?;
    app.complete_bronze(document_id).await?;
    app.add_chunk(document_id, 0, "completed").await?;

    let worker = worker(&app, GoldLayer::Vector, Arc::new(OversizedIdSink));
    assert!(worker.tick().await?);

    let distributions = app.distributions(document_id).await?;
    assert_eq!(distributions[0]["gold_c"]["status"], "failed");
    assert!(distributions[0]["gold_c"]["destination_id"].is_null());
    assert!(distributions[0]["gold_c"]["error"]
        .as_str()
        .unwrap()
        .contains("destination_id"));

    let jobs = app.jobs_by_type("distribute-gold-c").await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, "succeeded");
    assert!(!worker.tick().await?);

    app.cleanup().await?;
    Ok(())
}
