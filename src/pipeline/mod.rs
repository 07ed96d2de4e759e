//! The filter-match-forward pipeline.
//!
//! Data flow: capture event → [`ingest::IngestionPipeline`] (real-time path) →
//! persist → [`processor::ForwardProcessor`] → [`rules`] matching →
//! email/API channels → forward-status update. The periodic sweep re-enters
//! the same processor for every message still unforwarded.

pub mod ingest;
pub mod processor;
pub mod rules;
pub mod types;

pub use ingest::{IngestionPipeline, MessageSource, NewSms, SweepReport};
pub use processor::ForwardProcessor;
pub use rules::FilterRule;
pub use types::{ForwardResult, SmsMessage};
