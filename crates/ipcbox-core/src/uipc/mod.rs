//! Endpoints, envelopes and topic pub/sub
//!
//! An endpoint is a named inbox: a [`Queue`](crate::queue::Queue) of encoded
//! [`Envelope`]s plus a registry of topic subscriptions. Publishing to a topic
//! sends one envelope to each subscribed endpoint.

pub mod endpoint;
pub mod envelope;
pub mod pubsub;

pub use endpoint::Uipc;
pub use envelope::{field, version_supported, Envelope, UIPC_VERSION};
pub use pubsub::PublishReport;
