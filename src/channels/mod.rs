//! Delivery channels — independent sinks the processor fans out to.
//!
//! Each channel is a trait over an injected transport primitive so the
//! processor can be exercised against mocks. Production implementations:
//! SMTP via lettre, HTTP via reqwest.

pub mod api;
pub mod email;

pub use api::{ApiChannel, ApiResponse, HttpApiChannel};
pub use email::{EmailChannel, SmtpChannel};
