//! Event bus integration via Apache Iggy.
//!
//! This module provides durable, partitioned publish-subscribe delivery of
//! porter lifecycle events (spec §2 Event Bus, §6 event contracts) to
//! downstream consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Event Flow                                      │
//! │                                                                             │
//! │  ┌──────────────┐     ┌──────────────────┐     ┌──────────────────────────┐ │
//! │  │   Services   │────▶│  IggyPublisher   │────▶│     Apache Iggy          │ │
//! │  │  (events)    │     │  (serialize &    │     │  (stream + partitions)   │ │
//! │  └──────────────┘     │   send)          │     └──────────────────────────┘ │
//! │                       └──────────────────┘                │                 │
//! │                                                           ▼                 │
//! │                                                  ┌─────────────────────┐    │
//! │                                                  │   Event Consumers   │    │
//! │                                                  │  (order/payout)     │    │
//! │                                                  └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Topics
//!
//! All dispatch events share a single stream and topic (see [`topics`]);
//! per-porter ordering comes from partitioning by
//! [`crate::types::events::DispatchEvent::partition_key`], not by topic
//! fan-out.
//!
//! # Usage
//!
//! ```ignore
//! use porter_dispatch_core::streaming::IggyPublisher;
//! use porter_dispatch_core::config::EventBusSettings;
//!
//! // Create publisher from settings
//! let publisher = IggyPublisher::new(&settings.event_bus).await?;
//!
//! // Publish events
//! publisher.publish(&event).await?;
//!
//! // Batch publish
//! publisher.publish_batch(&events).await?;
//! ```

mod iggy_publisher;
mod topics;

pub use iggy_publisher::IggyPublisher;
pub use topics::{Topic, TopicConfig, STREAM_NAME};
