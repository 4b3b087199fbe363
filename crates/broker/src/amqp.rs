// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AMQP 0.9.1 implementation of the broker contract (lapin).

use crate::{Broker, BrokerError, Delivery, CONTENT_TYPE_JSON, REASON_HEADER, RETRY_COUNT_HEADER};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Connection settings for the work queue.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
    pub queue: String,
    pub dlq: String,
    /// Prefetch bound; set equal to the consumer's concurrency.
    pub prefetch: u16,
    pub consumer_tag: String,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>, queue: impl Into<String>, prefetch: u16) -> Self {
        let queue = queue.into();
        let tag = nr_core::TokenId::new();
        Self {
            url: url.into(),
            dlq: format!("{queue}.dlq"),
            queue,
            prefetch,
            consumer_tag: format!("nr-runner-{}", tag.short(8)),
        }
    }
}

/// Broker over one AMQP channel. Deliveries keep their acker in a tag map
/// so the [`Delivery`] handed to the consumer stays transport-agnostic.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    consumer: Mutex<lapin::Consumer>,
    ackers: Mutex<HashMap<u64, Acker>>,
    config: AmqpConfig,
}

impl AmqpBroker {
    /// Connect, declare the priority work queue and its DLQ, and start
    /// consuming with a prefetch equal to the runner's concurrency.
    pub async fn connect(config: AmqpConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let mut queue_args = FieldTable::default();
        queue_args.insert(
            ShortString::from("x-max-priority"),
            AMQPValue::ShortShortUInt(nr_core::request::MAX_PRIORITY),
        );
        let durable = QueueDeclareOptions { durable: true, ..Default::default() };
        channel
            .queue_declare(&config.queue, durable, queue_args)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        channel
            .queue_declare(&config.dlq, durable, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        tracing::info!(queue = %config.queue, prefetch = config.prefetch, "amqp consumer started");
        Ok(Self {
            connection,
            channel,
            consumer: Mutex::new(consumer),
            ackers: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Connect with capped exponential backoff until `shutdown` fires.
    pub async fn connect_with_retry(
        config: AmqpConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, BrokerError> {
        let mut backoff = Duration::from_millis(500);
        let cap = Duration::from_secs(30);
        loop {
            match Self::connect(config.clone()).await {
                Ok(broker) => return Ok(broker),
                Err(e) => {
                    tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64,
                        "broker connect failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.cancelled() => return Err(BrokerError::Closed),
                    }
                    backoff = (backoff * 2).min(cap);
                }
            }
        }
    }

    fn take_acker(&self, tag: u64) -> Result<Acker, BrokerError> {
        self.ackers
            .lock()
            .remove(&tag)
            .ok_or_else(|| BrokerError::Ack(format!("unknown delivery tag {tag}")))
    }

    async fn publish_with_headers(
        &self,
        queue: &str,
        body: &[u8],
        priority: u8,
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(CONTENT_TYPE_JSON))
            .with_priority(priority)
            .with_headers(headers);
        self.channel
            .basic_publish(fixed_exchange(), queue, BasicPublishOptions::default(), body, properties)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }
}

// Direct-to-queue publishing goes through the default exchange.
fn fixed_exchange() -> &'static str {
    ""
}

fn header_u32(headers: Option<&FieldTable>, name: &str) -> u32 {
    let Some(table) = headers else { return 0 };
    match table.inner().get(name) {
        Some(AMQPValue::LongUInt(v)) => *v,
        Some(AMQPValue::LongInt(v)) => (*v).max(0) as u32,
        Some(AMQPValue::ShortUInt(v)) => u32::from(*v),
        Some(AMQPValue::ShortShortUInt(v)) => u32::from(*v),
        Some(AMQPValue::LongString(s)) => s.to_string().parse().unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn next(&self) -> Result<Option<Delivery>, BrokerError> {
        // lapin's Consumer is Clone over shared internals; the lock only
        // guards the clone, never an await.
        let mut consumer = self.consumer.lock().clone();
        let next = consumer.next().await;

        let Some(delivery) = next else { return Ok(None) };
        let delivery = delivery.map_err(|e| BrokerError::Connection(e.to_string()))?;

        let retry_count = header_u32(delivery.properties.headers().as_ref(), RETRY_COUNT_HEADER);
        let reply_to = delivery.properties.reply_to().as_ref().map(|s| s.as_str().to_string());
        let priority = delivery.properties.priority().clone().unwrap_or(0);

        let tag = delivery.delivery_tag;
        self.ackers.lock().insert(tag, delivery.acker);

        Ok(Some(Delivery { tag, body: delivery.data, retry_count, reply_to, priority }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.take_acker(delivery.tag)?
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(ShortString::from(RETRY_COUNT_HEADER), AMQPValue::LongUInt(retry_count));
        self.publish_with_headers(&self.config.queue, &delivery.body, delivery.priority, headers)
            .await?;
        self.ack(delivery).await
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(REASON_HEADER),
            AMQPValue::LongString(reason.to_string().into()),
        );
        self.publish_with_headers(&self.config.dlq, &delivery.body, delivery.priority, headers)
            .await?;
        self.ack(delivery).await
    }

    async fn publish(&self, queue: &str, body: Vec<u8>, priority: u8) -> Result<(), BrokerError> {
        self.publish_with_headers(queue, &body, priority, FieldTable::default()).await
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}
