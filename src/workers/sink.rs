use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::models::{Document, ExtractedEntity, SilverChunk};
use crate::status::GoldLayer;

#[async_trait]
pub trait GoldSink: Send + Sync {
    async fn write(&self, document: &Document, chunk: &SilverChunk) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
pub struct SinkRequest<'a> {
    pub layer: GoldLayer,
    pub document_id: Uuid,
    pub original_filename: &'a str,
    pub silver_chunk_id: Uuid,
    pub chunk_index: i32,
    pub content: &'a str,
    pub token_count: i32,
    pub page_number: Option<i32>,
    pub has_table: bool,
    pub has_image: bool,
    pub section_hierarchy: &'a [String],
    pub extracted_entities: Vec<ExtractedEntity>,
}

impl<'a> SinkRequest<'a> {
    pub fn new(layer: GoldLayer, document: &'a Document, chunk: &'a SilverChunk) -> Self {
        Self {
            layer,
            document_id: document.id,
            original_filename: &document.original_filename,
            silver_chunk_id: chunk.id,
            chunk_index: chunk.chunk_index,
            content: &chunk.content,
            token_count: chunk.token_count,
            page_number: chunk.page_number,
            has_table: chunk.has_table,
            has_image: chunk.has_image,
            section_hierarchy: &chunk.section_hierarchy,
            extracted_entities: chunk.entities(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SinkResponse {
    id: String,
}

pub struct HttpSink {
    layer: GoldLayer,
    endpoint: Url,
    client: Client,
}

impl HttpSink {
    pub fn new(layer: GoldLayer, endpoint: Url) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            layer,
            endpoint,
            client,
        }
    }
}

#[async_trait]
impl GoldSink for HttpSink {
    async fn write(&self, document: &Document, chunk: &SilverChunk) -> anyhow::Result<String> {
        let request = SinkRequest::new(self.layer, document, chunk);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.layer.destination()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{} responded with {status}: {}",
                self.layer.destination(),
                body.trim()
            ));
        }

        let parsed: SinkResponse = response
            .json()
            .await
            .context("sink response missing destination id")?;
        parse_destination_id(parsed.id)
    }
}

fn parse_destination_id(id: String) -> anyhow::Result<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("sink returned an empty destination id"));
    }
    Ok(trimmed.to_string())
}
