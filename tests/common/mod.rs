use std::env;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use medallion::config::AppConfig;
use medallion::db::{self, PgPool};
use medallion::models::Job;
use medallion::routes;
use medallion::state::AppState;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            worker_poll_interval: Duration::from_secs(1),
            gold_a_sink_url: None,
            gold_b_sink_url: None,
            gold_c_sink_url: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let state = AppState::new(pool, config);
        let router = routes::create_router(state.clone());

        Ok(Self { state, router })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use medallion::schema::jobs::dsl::{created_at, job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .order(created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn clear_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            use medallion::schema::jobs::dsl::jobs as jobs_table;
            diesel::delete(jobs_table)
                .execute(conn)
                .context("failed to clear jobs")?;
            Ok(())
        })
        .await
    }

    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value)?)
            }
            None => Body::empty(),
        };
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, None).await
    }

    #[allow(dead_code)]
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Some(serde_json::to_value(payload)?))
            .await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::PATCH, path, Some(serde_json::to_value(payload)?))
            .await
    }

    /// Sends the request and decodes the body, insisting on `expected`.
    #[allow(dead_code)]
    pub async fn expect_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Result<T> {
        let response = self.send(method.clone(), path, body).await?;
        let status = response.status();
        let bytes = body_to_vec(response.into_body()).await?;
        ensure!(
            status == expected,
            "{method} {path} returned {status}: {}",
            String::from_utf8_lossy(&bytes)
        );
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[allow(dead_code)]
    pub async fn create_category(&self, name: &str, layers: &[&str]) -> Result<Uuid> {
        let created: Value = self
            .expect_json(
                Method::POST,
                "/api/document-categories",
                Some(json!({ "name": name, "target_gold_layers": layers })),
                StatusCode::OK,
            )
            .await?;
        parse_id(&created)
    }

    #[allow(dead_code)]
    pub async fn register_document(&self, file_key: &str, category: Option<Uuid>) -> Result<Uuid> {
        let created: Value = self
            .expect_json(
                Method::POST,
                "/api/documents",
                Some(json!({
                    "original_filename": "quarterly.pdf",
                    "file_key": file_key,
                    "file_size": 2048,
                    "mime_type": "application/pdf",
                    "document_category_id": category,
                })),
                StatusCode::OK,
            )
            .await?;
        parse_id(&created)
    }

    #[allow(dead_code)]
    pub async fn complete_bronze(&self, document_id: Uuid) -> Result<Value> {
        self.expect_json(
            Method::POST,
            &format!("/api/documents/{document_id}/bronze"),
            Some(json!({ "extracted_text": "Revenue grew in every region.", "metadata": { "pages": 3 } })),
            StatusCode::OK,
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn add_chunk(&self, document_id: Uuid, index: i32, status: &str) -> Result<Uuid> {
        let created: Value = self
            .expect_json(
                Method::POST,
                &format!("/api/documents/{document_id}/silver-chunks"),
                Some(json!({
                    "chunk_index": index,
                    "content": format!("chunk {index} body"),
                    "token_count": 4,
                    "page_number": index + 1,
                    "section_hierarchy": ["Report", "Results"],
                    "extracted_entities": [{
                        "type": "ORG",
                        "value": "Acme",
                        "normalized_value": "acme",
                        "start_offset": 0,
                        "end_offset": 4,
                        "confidence": 0.91
                    }],
                    "processing_status": status,
                })),
                StatusCode::OK,
            )
            .await?;
        parse_id(&created)
    }

    #[allow(dead_code)]
    pub async fn set_chunk_status(
        &self,
        chunk_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<Value> {
        self.expect_json(
            Method::PATCH,
            &format!("/api/silver-chunks/{chunk_id}"),
            Some(json!({ "status": status, "error_message": error_message })),
            StatusCode::OK,
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn distributions(&self, document_id: Uuid) -> Result<Vec<Value>> {
        self.expect_json(
            Method::GET,
            &format!("/api/documents/{document_id}/gold-distributions"),
            None,
            StatusCode::OK,
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn dispatch(&self, distribution_id: &str, layer: &str) -> Result<Value> {
        self.expect_json(
            Method::POST,
            &format!("/api/gold-distributions/{distribution_id}/layers/{layer}/dispatch"),
            None,
            StatusCode::OK,
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn report(&self, distribution_id: &str, layer: &str, outcome: Value) -> Result<hyper::Response<Body>> {
        self.send(
            Method::POST,
            &format!("/api/gold-distributions/{distribution_id}/layers/{layer}/result"),
            Some(outcome),
        )
        .await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn parse_id(value: &Value) -> Result<Uuid> {
    let raw = value["id"]
        .as_str()
        .ok_or_else(|| anyhow!("response has no id: {value}"))?;
    Ok(raw.parse()?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&pool)?;
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE gold_distributions, silver_chunks, documents, document_categories, jobs RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
