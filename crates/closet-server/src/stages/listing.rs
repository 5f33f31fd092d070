//! Query/listing stage (read-only)
//!
//! Joins clothing items to their parent artifacts for one owner and mints a
//! fresh signed URL per clipart. A row whose URL generation fails is
//! returned with a null reference rather than omitted; an owner with no
//! data gets an empty list, not an error.

use closet_common::{sanitize_user_id, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::db::ClosetStore;
use crate::storage::ObjectStore;

/// Listing URLs live longer than the analysis source URL; a browser may
/// hold the page open for a while.
const LISTING_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetClosetQuery {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosetItem {
    pub clothing_id: Uuid,
    pub clothing_type: String,
    pub color: String,
    pub material: String,
    pub style: String,
    pub extra_info: String,
    pub new_image_s3_key: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosetResponse {
    pub items: Vec<ClosetItem>,
}

#[instrument(skip(store, storage, query), fields(user_id = %query.user_id))]
pub async fn handle(
    store: &(impl ClosetStore + ?Sized),
    storage: &(impl ObjectStore + ?Sized),
    query: GetClosetQuery,
) -> Result<ClosetResponse> {
    let user_id = sanitize_user_id(&query.user_id)?;

    let rows = store.list_closet(&user_id).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let image_url = match &row.clipart_key {
            Some(key) => match storage.presign(key, LISTING_URL_TTL).await {
                Ok(url) => Some(url),
                Err(e) => {
                    // One bad row must not sink the whole listing.
                    warn!(key = %key, "Failed to generate signed URL: {e}");
                    None
                }
            },
            None => None,
        };

        items.push(ClosetItem {
            clothing_id: row.clothing_id,
            clothing_type: row.clothing_type,
            color: row.color,
            material: row.material,
            style: row.style,
            extra_info: row.extra_info,
            new_image_s3_key: row.clipart_key,
            image_url,
        });
    }

    Ok(ClosetResponse { items })
}
