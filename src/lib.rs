//! SMS Gateway — filter, match, and forward inbound SMS to email and HTTP sinks.

pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod scheduler;
pub mod store;
