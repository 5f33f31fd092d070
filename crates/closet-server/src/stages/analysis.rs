//! Analysis stage (content -> structured attributes)
//!
//! Resolves the parent artifact from the object-store key, hands the vision
//! capability a fresh signed URL plus the fixed instruction template, and
//! persists every well-formed line of the response as a clothing item.

use closet_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::adapters::vision::VisionAdapter;
use crate::db::{ClosetStore, ClothingAttributes};
use crate::storage::ObjectStore;

/// How long the signed source URL stays readable; the vision capability
/// fetches the image itself, so this only needs to cover one request.
const SOURCE_URL_TTL: Duration = Duration::from_secs(300);

/// Number of comma-separated fields a response line must have.
const EXPECTED_FIELDS: usize = 5;

/// Instruction template the vision capability is asked to follow. One item
/// per line, exactly five comma-separated fields, no commentary.
const DETECTION_INSTRUCTIONS: &str = "Please analyze the following outfit image and return a list of identifiable clothing and accessory items. \
Only include items you are over 80% confident about. Exclude makeup, hairstyle, or background objects.\n\n\
For each item, return exactly one line in the following format:\n\
**Clothing Type, Color, Material, Style, Extra Info**\n\n\
Respond with one line per item. Do not include bullet points, numbering, or any explanation.\n\
Example response:\n\
T-Shirt, Red, Cotton, Casual, Graphic print on front\n\
Sunglasses, Black, Plastic, Aviator, Reflective lenses";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectCommand {
    pub s3_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub message: String,
    pub num_items_detected: usize,
}

impl DetectCommand {
    pub fn validate(&self) -> Result<()> {
        if self.s3_key.trim().is_empty() {
            return Err(StageError::ClientInput("Missing s3_key".to_string()));
        }
        Ok(())
    }
}

/// Parse the model text into clothing attributes.
///
/// A line is accepted only if it splits into exactly [`EXPECTED_FIELDS`]
/// comma-separated fields; anything else is dropped silently.
pub fn parse_clothing_lines(text: &str) -> Vec<ClothingAttributes> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() != EXPECTED_FIELDS {
                debug!(line, "Dropping malformed response line");
                return None;
            }
            Some(ClothingAttributes {
                clothing_type: parts[0].to_string(),
                color: parts[1].to_string(),
                material: parts[2].to_string(),
                style: parts[3].to_string(),
                extra_info: parts[4].to_string(),
            })
        })
        .collect()
}

#[instrument(skip(store, storage, vision, command), fields(s3_key = %command.s3_key))]
pub async fn handle(
    store: &(impl ClosetStore + ?Sized),
    storage: &(impl ObjectStore + ?Sized),
    vision: &(impl VisionAdapter + ?Sized),
    command: DetectCommand,
) -> Result<DetectResponse> {
    command.validate()?;

    // Parent resolution comes first: identity is never trusted from the
    // payload, and a missing artifact is terminal, not a wait condition.
    let image = store
        .find_image_by_key(&command.s3_key)
        .await?
        .ok_or_else(|| {
            StageError::ClientInput(format!("Image not found for key: {}", command.s3_key))
        })?;

    let image_url = storage.presign(&command.s3_key, SOURCE_URL_TTL).await?;

    let response_text = vision
        .describe_image(&image_url, DETECTION_INSTRUCTIONS)
        .await?;

    let items = parse_clothing_lines(&response_text);
    if items.is_empty() {
        warn!("Analysis response contained no usable lines");
        return Err(StageError::adapter(
            "No valid clothing items found in analysis response",
        ));
    }

    for attributes in &items {
        store.insert_clothing_item(image.id, attributes).await?;
    }

    info!(image_id = %image.id, items = items.len(), "Clothing items persisted");

    Ok(DetectResponse {
        message: "Clothing detection completed successfully.".to_string(),
        num_items_detected: items.len(),
    })
}
