//! Apache Iggy event publisher implementation.
//!
//! Implements the [`EventPublisher`] port using Apache Iggy as the durable,
//! partitioned streaming backend (spec §2 Event Bus). Every dispatch event
//! is published under [`STREAM_NAME`]'s single [`Topic::Events`] topic,
//! keyed by [`DispatchEvent::partition_key`] so Iggy routes all events
//! about one porter/user to the same partition (spec §5 per-key ordering).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use iggy::client::{Client, MessageClient, StreamClient, TopicClient};
use iggy::clients::client::IggyClient;
use iggy::compression::compression_algorithm::CompressionAlgorithm;
use iggy::identifier::Identifier;
use iggy::messages::send_messages::{Message, Partitioning};
use iggy::utils::expiry::IggyExpiry;
use iggy::utils::topic_size::MaxTopicSize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::EventBusSettings;
use crate::error::{InfraError, Result};
use crate::ports::EventPublisher;
use crate::types::events::DispatchEvent;

use super::topics::{Topic, STREAM_NAME};

/// Apache Iggy-based event publisher.
///
/// Connects to an Iggy server and publishes dispatch events to the
/// `porter-dispatch` stream. Handles stream/topic creation lazily and
/// manages reconnection.
///
/// # Thread Safety
///
/// This type is `Send + Sync` and can be shared across tasks.
pub struct IggyPublisher {
    /// The Iggy client.
    client: Arc<IggyClient>,
    /// Number of partitions for the dispatch stream's topic.
    partition_count: u32,
    /// Whether we're connected to the Iggy server.
    connected: AtomicBool,
    /// Whether we've initialized the stream and topic.
    initialized: AtomicBool,
    /// Lock for initialization to prevent races.
    init_lock: RwLock<()>,
}

impl std::fmt::Debug for IggyPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IggyPublisher")
            .field("stream_name", &STREAM_NAME)
            .field("partition_count", &self.partition_count)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl IggyPublisher {
    /// Create a new Iggy publisher from settings.
    ///
    /// This creates the client but does NOT connect. Call [`Self::connect`]
    /// to establish the connection, or let it connect lazily on first
    /// publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(settings: &EventBusSettings) -> Result<Self> {
        let client = IggyClient::builder()
            .with_tcp()
            .with_server_address(settings.url.clone())
            .build()
            .map_err(|e| InfraError::EventBus(format!("failed to create Iggy client: {e}").into()))?;

        Ok(Self {
            client: Arc::new(client),
            partition_count: settings.partition_count,
            connected: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            init_lock: RwLock::new(()),
        })
    }

    /// Connect to the Iggy server.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        self.client
            .connect()
            .await
            .map_err(|e| InfraError::EventBus(format!("failed to connect to Iggy: {e}").into()))?;

        self.connected.store(true, Ordering::SeqCst);
        info!(stream = STREAM_NAME, "connected to Iggy server");
        Ok(())
    }

    /// Disconnect from the Iggy server.
    ///
    /// # Errors
    ///
    /// Returns an error if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| InfraError::EventBus(format!("failed to disconnect from Iggy: {e}").into()))?;

        self.connected.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        info!("disconnected from Iggy server");
        Ok(())
    }

    /// Ensure the stream and topic exist. Called lazily on first publish;
    /// idempotent. Auto-connects if not already connected.
    #[instrument(skip(self))]
    async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.init_lock.write().await;
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        if !self.connected.load(Ordering::SeqCst) {
            self.connect().await?;
        }

        self.ensure_stream_exists().await?;
        for topic in Topic::all() {
            self.ensure_topic_exists(*topic).await?;
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(stream = STREAM_NAME, "initialized Iggy stream and topic");
        Ok(())
    }

    async fn ensure_stream_exists(&self) -> Result<()> {
        let stream_id = Identifier::from_str_value(STREAM_NAME)
            .map_err(|e| InfraError::EventBus(format!("invalid stream name: {e}").into()))?;

        match self.client.get_stream(&stream_id).await {
            Ok(Some(_)) => {
                debug!(stream = STREAM_NAME, "stream already exists");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                let err_str = e.to_string();
                if !err_str.contains("not found") && !err_str.contains("NotFound") {
                    return Err(InfraError::EventBus(format!("failed to check stream: {e}").into()).into());
                }
            }
        }

        match self.client.create_stream(STREAM_NAME, Some(1)).await {
            Ok(_) => {
                info!(stream = STREAM_NAME, "created Iggy stream");
                Ok(())
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("already exists") || err_str.contains("AlreadyExists") {
                    debug!(stream = STREAM_NAME, "stream already exists (race)");
                    Ok(())
                } else {
                    Err(InfraError::EventBus(format!("failed to create stream: {e}").into()).into())
                }
            }
        }
    }

    async fn ensure_topic_exists(&self, topic: Topic) -> Result<()> {
        let stream_id = Identifier::from_str_value(STREAM_NAME)
            .map_err(|e| InfraError::EventBus(format!("invalid stream name: {e}").into()))?;
        let topic_id = Identifier::from_str_value(topic.as_str())
            .map_err(|e| InfraError::EventBus(format!("invalid topic name: {e}").into()))?;

        match self.client.get_topic(&stream_id, &topic_id).await {
            Ok(Some(_)) => {
                debug!(%topic, "topic already exists");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                let err_str = e.to_string();
                if !err_str.contains("not found") && !err_str.contains("NotFound") {
                    return Err(InfraError::EventBus(format!("failed to check topic: {e}").into()).into());
                }
            }
        }

        match self
            .client
            .create_topic(
                &stream_id,
                topic.as_str(),
                self.partition_count,
                CompressionAlgorithm::None,
                None,
                None,
                IggyExpiry::ServerDefault,
                MaxTopicSize::ServerDefault,
            )
            .await
        {
            Ok(_) => {
                info!(%topic, partitions = self.partition_count, "created Iggy topic");
                Ok(())
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("already exists") || err_str.contains("AlreadyExists") {
                    debug!(%topic, "topic already exists (race)");
                    Ok(())
                } else {
                    Err(InfraError::EventBus(format!("failed to create topic: {e}").into()).into())
                }
            }
        }
    }

    fn serialize_event(event: &DispatchEvent) -> Result<Bytes> {
        serde_json::to_vec(event)
            .map(Bytes::from)
            .map_err(|e| InfraError::EventBus(format!("failed to serialize event: {e}").into()).into())
    }

    fn message_for(payload: Bytes) -> Message {
        // Message payload length is capped at u32::MAX by Iggy's protocol;
        // event payloads never approach that.
        #[allow(clippy::cast_possible_truncation)]
        let length = payload.len() as u32;
        Message { id: 0, length, payload, headers: None }
    }

    #[instrument(skip(self, messages), fields(%topic, %partition_key, count = messages.len()))]
    async fn send_to_topic(&self, topic: Topic, partition_key: &str, messages: &mut [Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let stream_id = Identifier::from_str_value(STREAM_NAME)
            .map_err(|e| InfraError::EventBus(format!("invalid stream name: {e}").into()))?;
        let topic_id = Identifier::from_str_value(topic.as_str())
            .map_err(|e| InfraError::EventBus(format!("invalid topic name: {e}").into()))?;
        let partitioning = Partitioning::messages_key_str(partition_key)
            .map_err(|e| InfraError::EventBus(format!("invalid partition key: {e}").into()))?;

        self.client
            .send_messages(&stream_id, &topic_id, &partitioning, messages)
            .await
            .map_err(|e| InfraError::EventBus(format!("failed to send messages: {e}").into()))?;

        debug!(%topic, count = messages.len(), "published messages to Iggy");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for IggyPublisher {
    #[instrument(skip(self, event), fields(event_type = event.type_name(), partition_key = %event.partition_key()))]
    async fn publish(&self, event: &DispatchEvent) -> Result<()> {
        self.ensure_initialized().await?;

        let topic = Topic::for_event(event);
        let partition_key = event.partition_key();
        let payload = Self::serialize_event(event)?;
        let mut message = Self::message_for(payload);

        self.send_to_topic(topic, &partition_key, std::slice::from_mut(&mut message)).await
    }

    #[instrument(skip(self, payload), fields(%topic, %partition_key, size = payload.len()))]
    async fn publish_to_topic(&self, topic: &str, partition_key: &str, payload: &[u8]) -> Result<()> {
        self.ensure_initialized().await?;

        let stream_id = Identifier::from_str_value(STREAM_NAME)
            .map_err(|e| InfraError::EventBus(format!("invalid stream name: {e}").into()))?;
        let topic_id = Identifier::from_str_value(topic)
            .map_err(|e| InfraError::EventBus(format!("invalid topic name: {e}").into()))?;
        let partitioning = Partitioning::messages_key_str(partition_key)
            .map_err(|e| InfraError::EventBus(format!("invalid partition key: {e}").into()))?;

        let mut message = Self::message_for(Bytes::copy_from_slice(payload));

        self.client
            .send_messages(&stream_id, &topic_id, &partitioning, std::slice::from_mut(&mut message))
            .await
            .map_err(|e| InfraError::EventBus(format!("failed to send message: {e}").into()))?;

        Ok(())
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn publish_batch(&self, events: &[DispatchEvent]) -> Result<()> {
        use std::collections::HashMap;

        if events.is_empty() {
            return Ok(());
        }

        self.ensure_initialized().await?;

        // Grouped by (topic, partition_key): everything sharing one
        // partition key is still one `send_messages` call, matching the
        // per-porter ordering guarantee even across a batch.
        let mut grouped: HashMap<(Topic, String), Vec<Message>> = HashMap::new();
        for event in events {
            let key = (Topic::for_event(event), event.partition_key());
            let payload = Self::serialize_event(event)?;
            grouped.entry(key).or_default().push(Self::message_for(payload));
        }

        for ((topic, partition_key), mut messages) in grouped {
            self.send_to_topic(topic, &partition_key, &mut messages).await?;
        }

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Iggy has no explicit flush; messages are sent synchronously.
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> EventBusSettings {
        EventBusSettings {
            url: "tcp://localhost:8090".to_string(),
            stream_name: STREAM_NAME.to_string(),
            partition_count: 1,
            replication_factor: 1,
            username: "iggy".to_string(),
            password: "iggy".to_string(),
        }
    }

    #[test]
    fn publisher_debug_format() {
        // Constructing a client doesn't connect, so this doesn't need a
        // running Iggy server.
        let publisher = IggyPublisher::new(&test_settings()).expect("client construction");
        let debug_str = format!("{publisher:?}");
        assert!(debug_str.contains("IggyPublisher"));
        assert!(debug_str.contains(STREAM_NAME));
    }

    #[test]
    fn new_publisher_is_not_connected() {
        let publisher = IggyPublisher::new(&test_settings()).expect("client construction");
        assert!(!publisher.is_connected());
    }
}
