//! External capability adapters
//!
//! Each adapter wraps one external inference capability behind a trait so
//! stage handlers stay testable without network access:
//!
//! - [`vision::VisionAdapter`]: multimodal image description (analysis)
//! - [`imagegen::ImageGenAdapter`]: stylized image synthesis
//! - [`extract::ExtractionAdapter`]: long-running document text extraction
//!
//! Adapter failures carry the upstream's raw error text and are never
//! retried automatically.

pub mod extract;
pub mod imagegen;
pub mod vision;
