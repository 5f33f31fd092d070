//! Synthesis stage (content -> derived asset)
//!
//! Fetches the source artifact, asks the synthesis capability for a
//! stylized derivative, uploads it under a deterministic key and overwrites
//! the clothing records' clipart pointer. Deterministic key + overwrite
//! update makes re-invocation converge instead of duplicating.

use closet_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::imagegen::ImageGenAdapter;
use crate::db::ClosetStore;
use crate::storage::{clipart_key, ObjectStore};

/// Instruction template for the stylized derivative.
const CLIPART_INSTRUCTIONS: &str = "Generate an image of the clothing and accessories in this photo. Use soft colors, thick outlines, and a plain white background. \
Avoid shadows and realistic textures to make it look like a clean digital sticker or illustration. \
Focus on capturing the clothing style and shape clearly.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipartCommand {
    pub s3_key: String,
    pub clothing_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipartResponse {
    pub message: String,
    pub new_image_s3_key: String,
}

impl ClipartCommand {
    pub fn validate(&self) -> Result<()> {
        if self.s3_key.trim().is_empty() {
            return Err(StageError::ClientInput("Missing s3_key".to_string()));
        }
        Ok(())
    }
}

#[instrument(skip(store, storage, imagegen, command), fields(s3_key = %command.s3_key))]
pub async fn handle(
    store: &(impl ClosetStore + ?Sized),
    storage: &(impl ObjectStore + ?Sized),
    imagegen: &(impl ImageGenAdapter + ?Sized),
    command: ClipartCommand,
) -> Result<ClipartResponse> {
    command.validate()?;

    let image = store
        .find_image_by_key(&command.s3_key)
        .await?
        .ok_or_else(|| {
            StageError::ClientInput(format!("Image not found for key: {}", command.s3_key))
        })?;

    let source_bytes = storage.get(&command.s3_key).await?;

    let derived = imagegen
        .stylize(&source_bytes, "image/jpeg", CLIPART_INSTRUCTIONS)
        .await?;

    let new_key = clipart_key(&image.user_id, &image.id.to_string());

    storage.put(&new_key, derived, "image/png").await?;

    // Overwrite, never append: retries converge to the latest derivative.
    let updated = store.set_clipart_key(command.clothing_id, &new_key).await?;
    if updated == 0 {
        warn!(clothing_id = %command.clothing_id, "No clothing items to attach clipart to yet");
    }

    info!(key = %new_key, rows = updated, "Clipart uploaded and attached");

    Ok(ClipartResponse {
        message: "Clipart created and uploaded successfully.".to_string(),
        new_image_s3_key: new_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ClothingAttributes;
    use crate::stages::test_support::{MemoryCloset, MemoryStore, StaticImageGen};

    fn attributes() -> ClothingAttributes {
        ClothingAttributes {
            clothing_type: "Shirt".to_string(),
            color: "Blue".to_string(),
            material: "Cotton".to_string(),
            style: "Casual".to_string(),
            extra_info: "Has collar".to_string(),
        }
    }

    #[tokio::test]
    async fn uploads_derivative_and_sets_pointer() {
        let store = MemoryCloset::default();
        let storage = MemoryStore::default();
        let image_id = Uuid::new_v4();
        store.seed_image(image_id, "abc", "abc/img.jpg");
        store.seed_clothing(image_id, attributes());
        storage.seed("abc/img.jpg", b"source".to_vec());

        let imagegen = StaticImageGen::new(b"sticker-v1".to_vec());

        let response = handle(
            &store,
            &storage,
            &imagegen,
            ClipartCommand {
                s3_key: "abc/img.jpg".to_string(),
                clothing_id: image_id,
            },
        )
        .await
        .unwrap();

        let expected_key = format!("abc/closet_items/{image_id}.png");
        assert_eq!(response.new_image_s3_key, expected_key);
        assert_eq!(storage.bytes(&expected_key).unwrap(), b"sticker-v1");
        assert_eq!(
            store.clipart_keys_for(image_id),
            vec![Some(expected_key)]
        );
    }

    #[tokio::test]
    async fn rerun_overwrites_instead_of_duplicating() {
        let store = MemoryCloset::default();
        let storage = MemoryStore::default();
        let image_id = Uuid::new_v4();
        store.seed_image(image_id, "abc", "abc/img.jpg");
        store.seed_clothing(image_id, attributes());
        storage.seed("abc/img.jpg", b"source".to_vec());

        let command = ClipartCommand {
            s3_key: "abc/img.jpg".to_string(),
            clothing_id: image_id,
        };

        handle(&store, &storage, &StaticImageGen::new(b"v1".to_vec()), command.clone())
            .await
            .unwrap();
        handle(&store, &storage, &StaticImageGen::new(b"v2".to_vec()), command)
            .await
            .unwrap();

        // Still exactly one clothing row, pointing at the latest derivative.
        let expected_key = format!("abc/closet_items/{image_id}.png");
        assert_eq!(store.clothing_count_for(image_id), 1);
        assert_eq!(
            store.clipart_keys_for(image_id),
            vec![Some(expected_key.clone())]
        );
        assert_eq!(storage.bytes(&expected_key).unwrap(), b"v2");
    }

    #[tokio::test]
    async fn unknown_artifact_is_terminal_client_error() {
        let store = MemoryCloset::default();
        let storage = MemoryStore::default();
        let imagegen = StaticImageGen::new(b"sticker".to_vec());

        let err = handle(
            &store,
            &storage,
            &imagegen,
            ClipartCommand {
                s3_key: "nobody/missing.jpg".to_string(),
                clothing_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StageError::ClientInput(_)));
    }

    #[tokio::test]
    async fn adapter_failure_leaves_pointer_untouched() {
        let store = MemoryCloset::default();
        let storage = MemoryStore::default();
        let image_id = Uuid::new_v4();
        store.seed_image(image_id, "abc", "abc/img.jpg");
        store.seed_clothing(image_id, attributes());
        storage.seed("abc/img.jpg", b"source".to_vec());

        let imagegen = StaticImageGen::failing("no image from capability");

        let err = handle(
            &store,
            &storage,
            &imagegen,
            ClipartCommand {
                s3_key: "abc/img.jpg".to_string(),
                clothing_id: image_id,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StageError::Adapter { .. }));
        assert_eq!(store.clipart_keys_for(image_id), vec![None]);
    }
}
