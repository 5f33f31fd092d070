//! Ingest stage
//!
//! Accepts an upload payload, persists the artifact (bytes to the object
//! store, record to the relational store), then fans out to the analysis
//! and synthesis stages. Successors receive only the object-store key and
//! the new artifact identifier, never the raw bytes.

use base64::Engine;
use closet_common::{sanitize_user_id, Result, StageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::ClosetStore;
use crate::dispatch::{Stage, StageDispatcher};
use crate::storage::{artifact_key, ObjectStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCommand {
    pub user_id: String,
    pub filename: String,
    /// Base64-encoded file bytes.
    pub file_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub user_id: String,
    pub image_id: Uuid,
    pub s3_key: String,
}

impl UploadCommand {
    /// Validate required fields and return the sanitized owner identifier
    /// together with the filename extension.
    pub fn validate(&self) -> Result<(String, String)> {
        let user_id = sanitize_user_id(&self.user_id)?;

        if self.filename.trim().is_empty() {
            return Err(StageError::ClientInput("Missing filename".to_string()));
        }
        let extension = extension_of(&self.filename).ok_or_else(|| {
            StageError::ClientInput("filename must have an extension".to_string())
        })?;

        if self.file_content.trim().is_empty() {
            return Err(StageError::ClientInput("Missing file_content".to_string()));
        }

        Ok((user_id, extension.to_string()))
    }
}

fn extension_of(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[instrument(skip(store, storage, dispatcher, command), fields(filename = %command.filename))]
pub async fn handle(
    store: &(impl ClosetStore + ?Sized),
    storage: &(impl ObjectStore + ?Sized),
    dispatcher: &(impl StageDispatcher + ?Sized),
    command: UploadCommand,
) -> Result<UploadResponse> {
    let (user_id, extension) = command.validate()?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(command.file_content.trim())
        .map_err(|e| StageError::ClientInput(format!("file_content is not valid base64: {e}")))?;

    store.ensure_user(&user_id).await?;

    let image_id = Uuid::new_v4();
    let s3_key = artifact_key(&user_id, &image_id.to_string(), &extension);

    storage
        .put(&s3_key, bytes, content_type_for(&extension))
        .await?;

    store.insert_image(image_id, &user_id, &s3_key).await?;

    info!(user_id = %user_id, image_id = %image_id, s3_key = %s3_key, "Artifact ingested");

    // Successors get identifiers only; they fetch their own inputs.
    dispatcher
        .dispatch(Stage::DetectClothing, json!({ "s3_key": s3_key }))
        .await;
    dispatcher
        .dispatch(
            Stage::CreateClipart,
            json!({ "s3_key": s3_key, "clothing_id": image_id }),
        )
        .await;

    Ok(UploadResponse {
        message: "Upload successful. Clothing detection and clipart generation started."
            .to_string(),
        user_id,
        image_id,
        s3_key,
    })
}
