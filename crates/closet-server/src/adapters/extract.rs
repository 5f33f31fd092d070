//! Async document extraction adapter (document -> text)
//!
//! Wraps a long-running external text-detection capability with three
//! operations: start a job, poll its status, and fetch the line-level
//! results once it has succeeded. Backed by AWS Textract in production.

use async_trait::async_trait;
use aws_sdk_textract::types::{BlockType, DocumentLocation, JobStatus, S3Object};
use closet_common::{Result, StageError};
use tracing::{debug, instrument};

/// Observable status of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl ExtractionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExtractionStatus::InProgress)
    }
}

/// Long-running document text extraction capability.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Start extraction for an object; returns the external job identifier.
    async fn start(&self, bucket: &str, key: &str) -> Result<String>;

    /// Poll the current status of a previously started job.
    async fn poll(&self, extraction_job_id: &str) -> Result<ExtractionStatus>;

    /// Fetch the extracted line fragments, in the order the capability
    /// returns them. Only meaningful once the job has succeeded.
    async fn fetch_lines(&self, extraction_job_id: &str) -> Result<Vec<String>>;
}

/// Textract-backed extraction adapter.
#[derive(Clone)]
pub struct TextractExtraction {
    client: aws_sdk_textract::Client,
}

impl TextractExtraction {
    pub fn new(client: aws_sdk_textract::Client) -> Self {
        Self { client }
    }

    /// Build from the ambient AWS environment (credentials chain, region).
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_textract::Client::new(&config),
        }
    }
}

#[async_trait]
impl ExtractionAdapter for TextractExtraction {
    #[instrument(skip(self))]
    async fn start(&self, bucket: &str, key: &str) -> Result<String> {
        let location = DocumentLocation::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let response = self
            .client
            .start_document_text_detection()
            .document_location(location)
            .send()
            .await
            .map_err(|e| StageError::adapter(format!("Extraction start error: {e}")))?;

        let job_id = response
            .job_id()
            .map(str::to_string)
            .ok_or_else(|| StageError::adapter("Extraction capability returned no job id"))?;

        debug!(extraction_job_id = %job_id, "Extraction job started");

        Ok(job_id)
    }

    #[instrument(skip(self))]
    async fn poll(&self, extraction_job_id: &str) -> Result<ExtractionStatus> {
        let response = self
            .client
            .get_document_text_detection()
            .job_id(extraction_job_id)
            .send()
            .await
            .map_err(|e| StageError::adapter(format!("Extraction status error: {e}")))?;

        let status = match response.job_status() {
            Some(JobStatus::Succeeded) | Some(JobStatus::PartialSuccess) => {
                ExtractionStatus::Succeeded
            }
            Some(JobStatus::Failed) => ExtractionStatus::Failed,
            _ => ExtractionStatus::InProgress,
        };

        Ok(status)
    }

    #[instrument(skip(self))]
    async fn fetch_lines(&self, extraction_job_id: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get_document_text_detection()
                .job_id(extraction_job_id);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StageError::adapter(format!("Extraction results error: {e}")))?;

            for block in response.blocks() {
                if matches!(block.block_type(), Some(BlockType::Line)) {
                    if let Some(text) = block.text() {
                        lines.push(text.to_string());
                    }
                }
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(lines = lines.len(), "Extraction results fetched");

        Ok(lines)
    }
}
