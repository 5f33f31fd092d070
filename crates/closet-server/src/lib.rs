//! Closet Pipeline Server
//!
//! Multi-stage asynchronous processing pipeline for user-uploaded artifacts
//! (outfit photos and documents). There is no central orchestrator: each
//! stage performs one unit of work, persists its output, and invokes its
//! successors asynchronously, forming a fan-out DAG over shared storage.
//!
//! # Stages
//!
//! - **Ingest** (`POST /upload`): persist the artifact, then fan out to
//!   analysis and synthesis.
//! - **Analysis**: describe the image via a vision capability and persist
//!   the detected clothing items.
//! - **Synthesis**: generate a stylized clipart derivative and attach it to
//!   the clothing record.
//! - **Extraction** (`POST /events/document`): run a long-running document
//!   text extraction to completion, store the text, then fan out to the
//!   downstream consumers.
//! - **Listing** (`GET /closet/:user_id`): read-only closet view with fresh
//!   signed URLs.
//!
//! # Cross-stage state
//!
//! All state between stages flows through the object store (aws-sdk-s3) and
//! the relational store (sqlx/PostgreSQL). Stages never share in-process
//! memory; ordering is enforced only by data dependency, and a missing
//! predecessor record is a terminal error rather than a wait condition.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod stages;
pub mod storage;

// Re-export commonly used types
pub use error::ApiError;
