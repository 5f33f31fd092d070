//! Pipeline stage handlers
//!
//! Each stage is one independently invocable unit of work: it consumes a
//! well-defined payload, performs its work, persists its output through the
//! record store, and (where the pipeline calls for it) triggers successor
//! stages through the dispatcher. Stages share no in-process memory; all
//! cross-stage state lives in the object store and the relational store.
//!
//! Ordering between stages is enforced only by data dependency: a stage
//! whose predecessor data is absent fails with a terminal error instead of
//! waiting. The one intentional in-process wait is the extraction stage's
//! polling loop.

pub mod analysis;
pub mod extraction;
pub mod ingest;
pub mod listing;
pub mod synthesis;

#[cfg(test)]
pub mod test_support;
