mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn category_catalog_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let created: Value = app
        .expect_json(
            Method::POST,
            "/api/document-categories",
            Some(json!({ "name": "  Invoices ", "target_gold_layers": ["gold_c", "a", "gold_a"] })),
            StatusCode::OK,
        )
        .await?;
    assert_eq!(created["name"], "Invoices");
    assert_eq!(created["target_gold_layers"], json!(["gold_a", "gold_c"]));

    app.create_category("Correspondence", &["gold_b"]).await?;

    let listed: Vec<Value> = app
        .expect_json(Method::GET, "/api/document-categories", None, StatusCode::OK)
        .await?;
    let names: Vec<&str> = listed.iter().filter_map(|c| c["name"].as_str()).collect();
    assert_eq!(names, vec!["Correspondence", "Invoices"]);

    let duplicate = app
        .post_json(
            "/api/document-categories",
            &json!({ "name": "Invoices", "target_gold_layers": ["gold_b"] }),
        )
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let unknown_layer = app
        .post_json(
            "/api/document-categories",
            &json!({ "name": "Other", "target_gold_layers": ["gold_d"] }),
        )
        .await?;
    assert_eq!(unknown_layer.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(unknown_layer).await?;
    assert!(body["error"].as_str().unwrap().contains("gold_d"));

    let blank = app
        .post_json(
            "/api/document-categories",
            &json!({ "name": "   ", "target_gold_layers": [] }),
        )
        .await?;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn uncategorized_documents_target_every_layer() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let document_id = app.register_document("uploads/plain.txt", None).await?;
    app.complete_bronze(document_id).await?;
    app.add_chunk(document_id, 0, "completed").await?;

    let distributions = app.distributions(document_id).await?;
    assert_eq!(distributions.len(), 1);
    for layer in ["gold_a", "gold_b", "gold_c"] {
        assert_eq!(distributions[0][layer]["status"], "pending");
    }
    assert_eq!(
        distributions[0]["distribution_metadata"]["target_gold_layers"],
        json!(["gold_a", "gold_b", "gold_c"])
    );

    let unknown_category = app
        .post_json(
            "/api/documents",
            &json!({
                "original_filename": "orphan.pdf",
                "file_key": "uploads/orphan.pdf",
                "file_size": 1,
                "mime_type": "application/pdf",
                "document_category_id": uuid::Uuid::new_v4()
            }),
        )
        .await?;
    assert_eq!(unknown_category.status(), StatusCode::BAD_REQUEST);

    let health = app.get("/api/health").await?;
    assert_eq!(health.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
