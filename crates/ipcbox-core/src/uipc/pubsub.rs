//! Topic fan-out over endpoint inboxes
//!
//! # Directory Structure
//!
//! ```text
//! <pubsub_root>/
//!   <topic>/
//!     <flattened endpoint>  -> link tagged with the endpoint name
//! <uipc_root>/<endpoint>/subscriptions/
//!   <flattened topic>       -> link tagged with the topic name
//! ```
//!
//! The endpoint-side link is the authoritative membership record. The
//! topic-side link is the index publishers scan; a topic-side link without
//! its endpoint-side partner is stale and is pruned on the next publish.

use crate::io::atomic::{create_tagged, is_tagged, read_tag, remove_entry};
use crate::io::error::IpcError;
use crate::uipc::endpoint::{flatten, read_links, validate_name, Uipc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of a publish fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the message was enqueued for
    pub delivered: usize,

    /// Subscribers whose send failed (not retried)
    pub failed: usize,

    /// Stale topic-side links removed
    pub pruned: usize,
}

impl Uipc {
    /// Subscribe `endpoint` to `topic`, creating the topic if needed
    ///
    /// Links that already exist with the same tag are accepted. If the
    /// endpoint-side link cannot be created, a topic-side link made by this
    /// call is removed.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a link of the same name carries a different tag.
    pub fn subscribe(&self, endpoint: &str, topic: &str) -> Result<(), IpcError> {
        let topic_dir = self.topic_create(topic)?;
        let topic_link = topic_dir.join(flatten(endpoint));
        let endpoint_link = self
            .endpoint_path(endpoint)?
            .join("subscriptions")
            .join(flatten(topic));

        let created = claim_link(&topic_link, endpoint)?;

        if let Err(e) = claim_link(&endpoint_link, topic) {
            if created {
                if let Err(rm) = remove_entry(&topic_link) {
                    warn!(path = %topic_link.display(), error = %rm, "Failed to roll back topic link");
                }
            }
            return Err(e);
        }

        debug!(endpoint = %endpoint, topic = %topic, "Subscribed");
        Ok(())
    }

    /// Drop `endpoint`'s subscription to `topic`
    ///
    /// Both sides of the registry are removed; a missing topic-side link is
    /// not an error. Links are only removed when their tag names this
    /// endpoint and topic.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if the endpoint holds no subscription to `topic`.
    pub fn unsubscribe(&self, endpoint: &str, topic: &str) -> Result<(), IpcError> {
        let endpoint_link = self
            .endpoint_path(endpoint)?
            .join("subscriptions")
            .join(flatten(topic));

        let not_subscribed = || IpcError::NotSubscribed {
            endpoint: endpoint.to_string(),
            topic: topic.to_string(),
        };
        match read_tag(&endpoint_link) {
            Ok(tag) if tag == topic => {}
            Ok(_) => return Err(not_subscribed()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_subscribed()),
            Err(e) => return Err(IpcError::io(&endpoint_link, e)),
        }
        remove_entry(&endpoint_link).map_err(|e| IpcError::io(&endpoint_link, e))?;

        let topic_link = self.topic_path(topic)?.join(flatten(endpoint));
        match read_tag(&topic_link) {
            Ok(tag) if tag == endpoint => {
                if let Err(e) = remove_entry(&topic_link) {
                    warn!(path = %topic_link.display(), error = %e, "Failed to remove topic link");
                }
            }
            Ok(tag) => warn!(path = %topic_link.display(), tag = %tag, "Topic link names another endpoint"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %topic_link.display(), error = %e, "Failed to read topic link"),
        }

        debug!(endpoint = %endpoint, topic = %topic, "Unsubscribed");
        Ok(())
    }

    /// Send `message` from `endpoint` to every subscriber of `topic`
    ///
    /// Individual send failures are logged and counted but do not fail the
    /// call. Subscribers are re-read on every publish, so the fan-out reflects
    /// the registry at the time of the call.
    pub fn publish(
        &self,
        endpoint: &str,
        topic: &str,
        message: &[u8],
    ) -> Result<PublishReport, IpcError> {
        let topic_dir = self.topic_create(topic)?;
        let mut report = PublishReport::default();

        for subscriber in read_links(&topic_dir)? {
            if !self.is_subscribed(&subscriber, topic) {
                let stale = topic_dir.join(flatten(&subscriber));
                match remove_entry(&stale) {
                    Ok(()) => report.pruned += 1,
                    Err(e) => warn!(path = %stale.display(), error = %e, "Failed to prune stale link"),
                }
                debug!(topic = %topic, subscriber = %subscriber, "Pruned stale subscriber");
                continue;
            }

            match self.send(endpoint, &subscriber, message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(topic = %topic, subscriber = %subscriber, error = %e, "Publish to subscriber failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            topic = %topic,
            delivered = report.delivered,
            failed = report.failed,
            pruned = report.pruned,
            "Published"
        );
        Ok(report)
    }

    /// Endpoints listed under `topic`; empty if the topic does not exist.
    pub fn subscribers(&self, topic: &str) -> Result<Vec<String>, IpcError> {
        let topic_dir = self.topic_path(topic)?;
        if !topic_dir.is_dir() {
            return Ok(Vec::new());
        }
        read_links(&topic_dir)
    }

    fn is_subscribed(&self, endpoint: &str, topic: &str) -> bool {
        let Ok(path) = self.endpoint_path(endpoint) else {
            return false;
        };
        let link = path.join("subscriptions").join(flatten(topic));
        is_tagged(&link) && read_tag(&link).is_ok_and(|tag| tag == topic)
    }

    fn topic_path(&self, topic: &str) -> Result<PathBuf, IpcError> {
        validate_name(topic)?;
        Ok(self.pubsub_root.join(topic))
    }

    fn topic_create(&self, topic: &str) -> Result<PathBuf, IpcError> {
        let topic_dir = self.topic_path(topic)?;
        fs::create_dir_all(&topic_dir).map_err(|e| IpcError::io(&topic_dir, e))?;
        Ok(topic_dir)
    }
}

/// Create `link` tagged `tag`; an existing link is fine if it carries the same
/// tag. Returns whether this call created it.
fn claim_link(link: &Path, tag: &str) -> Result<bool, IpcError> {
    match create_tagged(link, tag) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_tag(link) {
            Ok(existing) if existing == tag => Ok(false),
            Ok(existing) => {
                warn!(path = %link.display(), existing = %existing, wanted = %tag, "Link name taken by another tag");
                Err(IpcError::AlreadyExists {
                    path: link.to_path_buf(),
                })
            }
            Err(e) => Err(IpcError::io(link, e)),
        },
        Err(e) => Err(IpcError::io(link, e)),
    }
}
