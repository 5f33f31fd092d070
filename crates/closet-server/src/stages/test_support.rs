//! In-memory doubles for stage handler tests.
//!
//! These substitute the object store, record store, adapters, dispatcher
//! and clock so stage semantics can be asserted without any live
//! infrastructure. The memory record store mirrors the SQL guarantees the
//! handlers rely on (idempotent user insert, clipart overwrite, monotonic
//! job results).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::extract::{ExtractionAdapter, ExtractionStatus};
use crate::adapters::imagegen::ImageGenAdapter;
use crate::adapters::vision::VisionAdapter;
use crate::db::{ClosetStore, ClothingAttributes, ClosetItemRow, ImageRecord};
use crate::dispatch::{Stage, StageDispatcher};
use crate::stages::extraction::Sleeper;
use crate::storage::ObjectStore;
use closet_common::StageError;

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing_presigns: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn seed(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn fail_presign_for(&self, key: &str) {
        self.failing_presigns.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.bytes(key)
            .ok_or_else(|| anyhow!("No such object: {key}"))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String> {
        if self.failing_presigns.lock().unwrap().contains(key) {
            return Err(anyhow!("Signing failed for {key}"));
        }
        Ok(format!(
            "https://signed.example/{key}?expires={}",
            expires_in.as_secs()
        ))
    }
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

struct ClothingRow {
    id: Uuid,
    image_id: Uuid,
    attributes: ClothingAttributes,
    clipart_key: Option<String>,
}

#[derive(Default)]
pub struct MemoryCloset {
    users: Mutex<HashSet<String>>,
    images: Mutex<Vec<ImageRecord>>,
    clothing: Mutex<Vec<ClothingRow>>,
    jobs: Mutex<HashMap<String, String>>,
}

impl MemoryCloset {
    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.lock().unwrap().contains(user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }

    pub fn image_by_key(&self, s3_key: &str) -> Option<ImageRecord> {
        self.images
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.s3_key == s3_key)
            .cloned()
    }

    pub fn seed_image(&self, id: Uuid, user_id: &str, s3_key: &str) {
        self.users.lock().unwrap().insert(user_id.to_string());
        self.images.lock().unwrap().push(ImageRecord {
            id,
            user_id: user_id.to_string(),
            s3_key: s3_key.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn seed_clothing(&self, image_id: Uuid, attributes: ClothingAttributes) -> Uuid {
        let id = Uuid::new_v4();
        self.clothing.lock().unwrap().push(ClothingRow {
            id,
            image_id,
            attributes,
            clipart_key: None,
        });
        id
    }

    pub fn set_clipart(&self, clothing_id: Uuid, key: &str) {
        for row in self.clothing.lock().unwrap().iter_mut() {
            if row.id == clothing_id {
                row.clipart_key = Some(key.to_string());
            }
        }
    }

    pub fn clothing_count_for(&self, image_id: Uuid) -> usize {
        self.clothing
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.image_id == image_id)
            .count()
    }

    pub fn clipart_keys_for(&self, image_id: Uuid) -> Vec<Option<String>> {
        self.clothing
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.image_id == image_id)
            .map(|r| r.clipart_key.clone())
            .collect()
    }

    pub fn job_result(&self, job_id: &str) -> Option<String> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }
}

#[async_trait]
impl ClosetStore for MemoryCloset {
    async fn ensure_user(&self, user_id: &str) -> Result<()> {
        self.users.lock().unwrap().insert(user_id.to_string());
        Ok(())
    }

    async fn insert_image(&self, id: Uuid, user_id: &str, s3_key: &str) -> Result<()> {
        self.images.lock().unwrap().push(ImageRecord {
            id,
            user_id: user_id.to_string(),
            s3_key: s3_key.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn find_image_by_key(&self, s3_key: &str) -> Result<Option<ImageRecord>> {
        Ok(self.image_by_key(s3_key))
    }

    async fn insert_clothing_item(
        &self,
        image_id: Uuid,
        attributes: &ClothingAttributes,
    ) -> Result<Uuid> {
        Ok(self.seed_clothing(image_id, attributes.clone()))
    }

    async fn set_clipart_key(&self, image_id: Uuid, clipart_key: &str) -> Result<u64> {
        let mut updated = 0;
        for row in self.clothing.lock().unwrap().iter_mut() {
            if row.image_id == image_id {
                row.clipart_key = Some(clipart_key.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_closet(&self, user_id: &str) -> Result<Vec<ClosetItemRow>> {
        let image_ids: HashSet<Uuid> = self
            .images
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.id)
            .collect();

        Ok(self
            .clothing
            .lock()
            .unwrap()
            .iter()
            .filter(|r| image_ids.contains(&r.image_id))
            .map(|r| ClosetItemRow {
                clothing_id: r.id,
                clothing_type: r.attributes.clothing_type.clone(),
                color: r.attributes.color.clone(),
                material: r.attributes.material.clone(),
                style: r.attributes.style.clone(),
                extra_info: r.attributes.extra_info.clone(),
                clipart_key: r.clipart_key.clone(),
            })
            .collect())
    }

    async fn set_job_result(&self, job_id: &str, value: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(job_id) {
            return Ok(false);
        }
        jobs.insert(job_id.to_string(), value.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingDispatcher {
    invocations: Mutex<Vec<(Stage, serde_json::Value)>>,
}

impl RecordingDispatcher {
    pub fn dispatched(&self) -> Vec<(Stage, serde_json::Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageDispatcher for RecordingDispatcher {
    async fn dispatch(&self, stage: Stage, payload: serde_json::Value) {
        self.invocations.lock().unwrap().push((stage, payload));
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

pub struct StaticVision {
    response: String,
}

impl StaticVision {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

#[async_trait]
impl VisionAdapter for StaticVision {
    async fn describe_image(
        &self,
        _image_url: &str,
        _instructions: &str,
    ) -> closet_common::Result<String> {
        Ok(self.response.clone())
    }
}

pub struct StaticImageGen {
    result: std::result::Result<Vec<u8>, String>,
}

impl StaticImageGen {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { result: Ok(bytes) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl ImageGenAdapter for StaticImageGen {
    async fn stylize(
        &self,
        _image: &[u8],
        _mime_type: &str,
        _instructions: &str,
    ) -> closet_common::Result<Vec<u8>> {
        match &self.result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(message) => Err(StageError::adapter(message.clone())),
        }
    }
}

/// Extraction double scripted with a number of in-progress polls before a
/// terminal status.
pub struct ScriptedExtraction {
    in_progress_polls: Mutex<u32>,
    terminal: ExtractionStatus,
    lines: Vec<String>,
    started: Mutex<u32>,
}

impl ScriptedExtraction {
    pub fn succeeding_after(in_progress_polls: u32, lines: Vec<String>) -> Self {
        Self {
            in_progress_polls: Mutex::new(in_progress_polls),
            terminal: ExtractionStatus::Succeeded,
            lines,
            started: Mutex::new(0),
        }
    }

    pub fn failing_after(in_progress_polls: u32) -> Self {
        Self {
            in_progress_polls: Mutex::new(in_progress_polls),
            terminal: ExtractionStatus::Failed,
            lines: Vec::new(),
            started: Mutex::new(0),
        }
    }

    pub fn start_count(&self) -> u32 {
        *self.started.lock().unwrap()
    }
}

#[async_trait]
impl ExtractionAdapter for ScriptedExtraction {
    async fn start(&self, _bucket: &str, _key: &str) -> closet_common::Result<String> {
        *self.started.lock().unwrap() += 1;
        Ok("ext-job-1".to_string())
    }

    async fn poll(&self, _extraction_job_id: &str) -> closet_common::Result<ExtractionStatus> {
        let mut remaining = self.in_progress_polls.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(ExtractionStatus::InProgress);
        }
        Ok(self.terminal)
    }

    async fn fetch_lines(&self, _extraction_job_id: &str) -> closet_common::Result<Vec<String>> {
        Ok(self.lines.clone())
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ManualSleeper {
    sleeps: Mutex<u64>,
}

impl ManualSleeper {
    pub fn sleep_count(&self) -> u64 {
        *self.sleeps.lock().unwrap()
    }
}

#[async_trait]
impl Sleeper for ManualSleeper {
    async fn sleep(&self, _duration: Duration) {
        *self.sleeps.lock().unwrap() += 1;
    }
}
