//! Streaming port for event publishing.
//!
//! Defines the contract for publishing dispatch lifecycle events to a
//! streaming system (Apache Iggy in production).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::events::DispatchEvent;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT PUBLISHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for event streaming/publishing.
///
/// Publishes [`DispatchEvent`]s to a streaming system for consumption by
/// downstream services (pricing, notifications, analytics).
///
/// # Partitioning
///
/// Events are partitioned by [`DispatchEvent::partition_key`] (the porter or
/// user id the event is about), so that all events about one porter are
/// strictly ordered relative to each other.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Use persistent message ids for exactly-once semantics
/// - Implement backpressure handling
/// - Buffer messages during network issues
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single dispatch event to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails after retries.
    async fn publish(&self, event: &DispatchEvent) -> Result<()>;

    /// Publish raw bytes to a specific topic/partition key.
    ///
    /// Use this for custom payloads or pre-serialized data.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails.
    async fn publish_to_topic(&self, topic: &str, partition_key: &str, payload: &[u8]) -> Result<()>;

    /// Publish a batch of events.
    ///
    /// More efficient than individual [`Self::publish`] calls.
    ///
    /// # Errors
    ///
    /// Returns an error if any publish fails. Implementations should
    /// document whether partial batches are committed.
    async fn publish_batch(&self, events: &[DispatchEvent]) -> Result<()>;

    /// Flush pending messages.
    ///
    /// Ensures all buffered messages are sent before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if flush fails.
    async fn flush(&self) -> Result<()>;

    /// Check if the publisher is connected.
    fn is_connected(&self) -> bool;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock implementations for testing.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Mock publisher that counts calls and optionally fails.
    #[derive(Debug, Clone)]
    pub struct MockEventPublisher {
        /// Number of events published.
        pub publish_count: Arc<AtomicUsize>,
        /// Whether to simulate connection.
        pub connected: Arc<AtomicBool>,
        /// Whether to fail on publish.
        pub should_fail: Arc<AtomicBool>,
    }

    impl Default for MockEventPublisher {
        fn default() -> Self {
            Self {
                publish_count: Arc::new(AtomicUsize::new(0)),
                connected: Arc::new(AtomicBool::new(true)),
                should_fail: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl MockEventPublisher {
        /// Create a new mock publisher.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Get the number of events published.
        #[must_use]
        pub fn count(&self) -> usize {
            self.publish_count.load(Ordering::SeqCst)
        }

        /// Set whether to simulate connection failure.
        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }

        /// Set whether to fail on publish.
        pub fn set_should_fail(&self, should_fail: bool) {
            self.should_fail.store(should_fail, Ordering::SeqCst);
        }
    }

    fn mock_failure() -> crate::error::AppError {
        crate::error::AppError::Infra(crate::error::InfraError::EventBus(
            "mock publish failure".into(),
        ))
    }

    #[async_trait]
    impl EventPublisher for MockEventPublisher {
        async fn publish(&self, _event: &DispatchEvent) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(mock_failure());
            }
            self.publish_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn publish_to_topic(&self, _topic: &str, _partition_key: &str, _payload: &[u8]) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(mock_failure());
            }
            self.publish_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn publish_batch(&self, events: &[DispatchEvent]) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(mock_failure());
            }
            self.publish_count.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}
