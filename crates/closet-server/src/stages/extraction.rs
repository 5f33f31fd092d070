//! Async extraction stage (document -> text) and fan-out
//!
//! Triggered by an object-store creation notification rather than a direct
//! payload. Starts a long-running text extraction, holds its own invocation
//! open while polling at a fixed cadence until the external job reaches a
//! terminal state, stores the extracted text, records the job result, and
//! only then fans out to the fixed set of downstream consumers.
//!
//! This polling loop is the single place in the pipeline where an operation
//! waits on another operation's completion in-process. There is no
//! persisted checkpoint during polling: a crash mid-poll leaves the job
//! result unset, which callers must treat as unknown/stuck and re-trigger.

use async_trait::async_trait;
use closet_common::{Result, StageError};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::adapters::extract::{ExtractionAdapter, ExtractionStatus};
use crate::db::ClosetStore;
use crate::dispatch::{Stage, StageDispatcher};
use crate::storage::{text_key, ObjectStore};

/// Persisted job-result marker for a failed extraction.
pub const JOB_ERROR_MARKER: &str = "Error";

/// Object-store creation notification, as delivered by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records")]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3BucketRef,
    pub object: S3ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ObjectRef {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub message: String,
    #[serde(rename = "textKey")]
    pub text_key: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
}

/// Injected sleep capability so tests can drive many poll iterations
/// without real elapsed time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// States of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Started,
    Polling,
    Succeeded,
    Failed,
}

/// Drive the poll loop until the external job reaches a terminal state.
pub async fn await_terminal_state(
    extraction: &(impl ExtractionAdapter + ?Sized),
    sleeper: &(impl Sleeper + ?Sized),
    poll_interval: Duration,
    extraction_job_id: &str,
) -> Result<PollState> {
    let mut state = PollState::Started;
    loop {
        state = match state {
            PollState::Started | PollState::Polling => {
                match extraction.poll(extraction_job_id).await? {
                    ExtractionStatus::Succeeded => PollState::Succeeded,
                    ExtractionStatus::Failed => PollState::Failed,
                    ExtractionStatus::InProgress => {
                        sleeper.sleep(poll_interval).await;
                        PollState::Polling
                    }
                }
            }
            terminal => return Ok(terminal),
        };
    }
}

/// Decode an object key as it appears in a notification event (space as
/// `+`, percent-escaped bytes).
pub fn decode_object_key(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| StageError::ClientInput(format!("Object key is not valid UTF-8: {e}")))
}

/// Job identifier derived deterministically from the triggering object key:
/// everything before the first dot.
pub fn job_id_from_key(key: &str) -> String {
    key.split('.').next().unwrap_or(key).to_string()
}

#[instrument(skip_all)]
pub async fn handle(
    store: &(impl ClosetStore + ?Sized),
    storage: &(impl ObjectStore + ?Sized),
    extraction: &(impl ExtractionAdapter + ?Sized),
    dispatcher: &(impl StageDispatcher + ?Sized),
    sleeper: &(impl Sleeper + ?Sized),
    poll_interval: Duration,
    event: S3Event,
) -> Result<ExtractionResponse> {
    let record = event
        .records
        .first()
        .ok_or_else(|| StageError::ClientInput("Notification contains no records".to_string()))?;

    let bucket = &record.s3.bucket.name;
    let object_key = decode_object_key(&record.s3.object.key)?;
    info!(bucket = %bucket, object_key = %object_key, "Document notification received");

    if !object_key.to_lowercase().ends_with(".pdf") {
        return Err(StageError::ClientInput(
            "Uploaded file is not a PDF".to_string(),
        ));
    }

    let job_id = job_id_from_key(&object_key);

    // Notifications can outlive their object; never start extraction
    // against a key that no longer resolves.
    if !storage.exists(&object_key).await? {
        store.set_job_result(&job_id, JOB_ERROR_MARKER).await?;
        return Err(StageError::InconsistentState(format!(
            "Object no longer exists: {object_key}"
        )));
    }

    let extraction_job_id = match extraction.start(bucket, &object_key).await {
        Ok(id) => id,
        Err(e) => {
            store.set_job_result(&job_id, JOB_ERROR_MARKER).await?;
            return Err(e);
        }
    };

    let final_state =
        await_terminal_state(extraction, sleeper, poll_interval, &extraction_job_id).await?;

    if final_state == PollState::Failed {
        store.set_job_result(&job_id, JOB_ERROR_MARKER).await?;
        return Err(StageError::adapter("Extraction job failed"));
    }

    let lines = extraction.fetch_lines(&extraction_job_id).await?;
    let extracted_text = lines.join("\n");

    let result_key = text_key(&job_id);
    storage
        .put(&result_key, extracted_text.into_bytes(), "text/plain")
        .await?;

    let applied = store.set_job_result(&job_id, &result_key).await?;
    if !applied {
        // A previous invocation already recorded a terminal result and, on
        // success, already fanned out. Do not notify consumers twice.
        warn!(job_id = %job_id, "Job result already recorded, skipping fan-out");
        return Ok(ExtractionResponse {
            message: "Extraction completed; result was already recorded.".to_string(),
            text_key: result_key,
            job_id,
        });
    }

    info!(job_id = %job_id, text_key = %result_key, "Extracted text stored");

    // Fan out only after the job result is durably recorded, and only on
    // success. Dispatch failures are logged by the dispatcher, not awaited.
    for consumer in Stage::EXTRACTION_CONSUMERS {
        dispatcher
            .dispatch(
                consumer,
                json!({ "textKey": result_key, "jobId": job_id }),
            )
            .await;
    }

    Ok(ExtractionResponse {
        message: "Extraction completed. Downstream processing started.".to_string(),
        text_key: result_key,
        job_id,
    })
}
