//! Event bus topic layout for dispatch events.
//!
//! The teacher routed each blockchain event family to its own topic
//! (`positions`, `scans`, `deaths`, ...). Dispatch lifecycle events don't
//! have that kind of fan-out-by-kind shape — what matters instead is that
//! every event about one porter lands in the same partition, in order
//! (spec §5/§6). So there's a single topic for the whole event stream, and
//! `Topic::for_event` has collapsed to picking that one topic; the
//! interesting dispatch happens in the publisher, which partitions by
//! [`crate::types::events::DispatchEvent::partition_key`] rather than by
//! topic.

use std::fmt;

use crate::types::events::DispatchEvent;

/// The single stream name dispatch events are published under.
pub const STREAM_NAME: &str = "porter-dispatch";

/// Topics within the dispatch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// All porter lifecycle and dispatch events.
    Events,
}

impl Topic {
    /// All topics that must exist in the stream.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Events]
    }

    /// The topic name as used in Iggy's API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
        }
    }

    /// Pick the topic an event should be published to.
    ///
    /// Every dispatch event currently shares one topic; this stays a
    /// function (rather than a constant) so a future event family that
    /// needs its own topic has somewhere to branch.
    #[must_use]
    pub const fn for_event(_event: &DispatchEvent) -> Self {
        Self::Events
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream/topic provisioning parameters.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Topic name.
    pub name: String,
    /// Number of partitions.
    pub partitions: u32,
    /// Message retention, in seconds. `None` means use the server default.
    pub retention_secs: Option<u64>,
}

impl TopicConfig {
    /// Build the config for a topic with a given partition count.
    #[must_use]
    pub fn new(topic: Topic, partitions: u32) -> Self {
        Self {
            name: topic.as_str().to_string(),
            partitions,
            retention_secs: None,
        }
    }

    /// Set message retention.
    #[must_use]
    pub const fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = Some(secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::events::{DispatchEvent, EventMetadata, PorterOnlineEvent};
    use crate::types::primitives::{CorrelationId, PorterId};
    use chrono::Utc;

    #[test]
    fn topic_names_are_lowercase() {
        for topic in Topic::all() {
            assert_eq!(topic.as_str(), topic.as_str().to_lowercase());
        }
    }

    #[test]
    fn every_event_routes_to_the_events_topic() {
        let event = DispatchEvent::PorterOnline(PorterOnlineEvent {
            meta: EventMetadata::new(CorrelationId::new(), Utc::now()),
            porter_id: PorterId::new(),
            location: None,
        });
        assert_eq!(Topic::for_event(&event), Topic::Events);
    }

    #[test]
    fn topic_config_defaults() {
        let config = TopicConfig::new(Topic::Events, 4);
        assert_eq!(config.name, "events");
        assert_eq!(config.partitions, 4);
        assert!(config.retention_secs.is_none());
    }

    #[test]
    fn topic_config_builder() {
        let config = TopicConfig::new(Topic::Events, 4).with_retention_secs(86_400);
        assert_eq!(config.retention_secs, Some(86_400));
    }
}
