//! Outbound webhooks for profile activity.
//!
//! - [`events`]: event types and payloads
//! - [`signing`]: Standard Webhooks HMAC-SHA256 signatures
//! - [`service`]: enqueueing deliveries when events happen
//! - [`dispatcher`]: the claim/sign/send/result loop run on the leader

pub mod dispatcher;
pub mod events;
pub mod service;
pub mod signing;

pub use dispatcher::{DispatchSummary, DispatcherSlot, WebhookDispatcher, run_dispatcher};
pub use events::{WebhookEvent, WebhookEventType};
pub use signing::{generate_secret, sign_payload};
