//! Stage dispatch
//!
//! Coordination between stages is encoded as "each stage invokes its
//! successors upon its own success" rather than a central scheduler. The
//! [`StageDispatcher`] trait is that single `invoke(stage, payload)`
//! capability; stage handlers depend on it abstractly so tests can record
//! invocations instead of performing them.
//!
//! Dispatch is fire-and-forget: no acknowledgment is awaited, a failed
//! dispatch is logged and never rolled back, and a failed successor never
//! propagates back into the stage that invoked it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::extract::TextractExtraction;
use crate::adapters::imagegen::GeminiImageGen;
use crate::adapters::vision::OpenAiVision;
use crate::db::PgClosetStore;
use crate::stages;
use crate::storage::Storage;

/// The invocable stages of the pipeline.
///
/// `DetectClothing` and `CreateClipart` are hosted in this process;
/// `Summary`, `Imagery` and `Music` are external consumers of extracted
/// text, reached over HTTP when an endpoint is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DetectClothing,
    CreateClipart,
    Summary,
    Imagery,
    Music,
}

impl Stage {
    /// The fixed set of consumers the extraction stage fans out to.
    pub const EXTRACTION_CONSUMERS: [Stage; 3] = [Stage::Summary, Stage::Imagery, Stage::Music];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DetectClothing => "detect_clothing",
            Stage::CreateClipart => "create_clipart",
            Stage::Summary => "summary",
            Stage::Imagery => "imagery",
            Stage::Music => "music",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget invocation of a successor stage.
#[async_trait]
pub trait StageDispatcher: Send + Sync {
    /// Invoke `stage` asynchronously with `payload`. Returns as soon as the
    /// invocation is handed off; outcomes are logged, not reported.
    async fn dispatch(&self, stage: Stage, payload: serde_json::Value);
}

/// Everything the in-process stage handlers need to run.
pub struct StageRuntime {
    pub store: PgClosetStore,
    pub storage: Storage,
    pub vision: OpenAiVision,
    pub imagegen: GeminiImageGen,
    pub extraction: TextractExtraction,
    pub poll_interval: Duration,
}

/// Production dispatcher. In-process stages run as spawned tasks against
/// the shared runtime; external consumer stages are POSTed their payload
/// when an endpoint is configured, and skipped with a warning otherwise.
#[derive(Clone)]
pub struct LocalDispatcher {
    runtime: Arc<StageRuntime>,
    consumer_endpoints: HashMap<Stage, String>,
    http: reqwest::Client,
}

impl LocalDispatcher {
    pub fn new(runtime: Arc<StageRuntime>, consumer_endpoints: HashMap<Stage, String>) -> Self {
        Self {
            runtime,
            consumer_endpoints,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StageDispatcher for LocalDispatcher {
    async fn dispatch(&self, stage: Stage, payload: serde_json::Value) {
        match stage {
            Stage::DetectClothing => {
                let runtime = Arc::clone(&self.runtime);
                tokio::spawn(async move {
                    let command = match serde_json::from_value(payload) {
                        Ok(command) => command,
                        Err(e) => {
                            error!(stage = %Stage::DetectClothing, "Invalid dispatch payload: {e}");
                            return;
                        }
                    };
                    match stages::analysis::handle(
                        &runtime.store,
                        &runtime.storage,
                        &runtime.vision,
                        command,
                    )
                    .await
                    {
                        Ok(response) => info!(
                            items = response.num_items_detected,
                            "Clothing detection completed"
                        ),
                        Err(e) => error!("Clothing detection failed: {e}"),
                    }
                });
            }
            Stage::CreateClipart => {
                let runtime = Arc::clone(&self.runtime);
                tokio::spawn(async move {
                    let command = match serde_json::from_value(payload) {
                        Ok(command) => command,
                        Err(e) => {
                            error!(stage = %Stage::CreateClipart, "Invalid dispatch payload: {e}");
                            return;
                        }
                    };
                    match stages::synthesis::handle(
                        &runtime.store,
                        &runtime.storage,
                        &runtime.imagegen,
                        command,
                    )
                    .await
                    {
                        Ok(response) => {
                            info!(key = %response.new_image_s3_key, "Clipart created")
                        }
                        Err(e) => error!("Clipart creation failed: {e}"),
                    }
                });
            }
            consumer => {
                let Some(endpoint) = self.consumer_endpoints.get(&consumer).cloned() else {
                    warn!(stage = %consumer, "No endpoint configured, dropping dispatch");
                    return;
                };
                let http = self.http.clone();
                tokio::spawn(async move {
                    match http.post(&endpoint).json(&payload).send().await {
                        Ok(response) if response.status().is_success() => {
                            info!(stage = %consumer, "Consumer notified")
                        }
                        Ok(response) => warn!(
                            stage = %consumer,
                            status = %response.status(),
                            "Consumer returned non-success"
                        ),
                        Err(e) => warn!(stage = %consumer, "Consumer dispatch failed: {e}"),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::DetectClothing.as_str(), "detect_clothing");
        assert_eq!(Stage::Music.to_string(), "music");
    }

    #[test]
    fn extraction_consumers_are_fixed() {
        assert_eq!(
            Stage::EXTRACTION_CONSUMERS,
            [Stage::Summary, Stage::Imagery, Stage::Music]
        );
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::CreateClipart).unwrap();
        assert_eq!(json, "\"create_clipart\"");
    }
}
