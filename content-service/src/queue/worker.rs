//! Per-delivery processing.
//!
//! Each delivery is handled under its own deadline, then either answered and
//! acknowledged, or rejected without requeue so it dead-letters instead of
//! looping.

use std::future::Future;
use std::time::Duration;

use lapin::{
    options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions},
    BasicProperties, Channel,
};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use super::handler::{HandlerError, MessageHandler};
use super::types::Delivery;
use super::BrokerError;

/// Budget for one handler call plus its reply publish.
pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// The channel operations a worker needs to settle a delivery.
pub trait DeliveryChannel: Send + Sync {
    /// Publish `body` as JSON to `reply_to` on the default exchange.
    fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn ack(&self, delivery_tag: u64) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Negative-acknowledge without requeue.
    fn reject(&self, delivery_tag: u64) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

impl DeliveryChannel for Channel {
    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default().with_content_type("application/json".into());
        if let Some(correlation_id) = correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }

        self.basic_publish("", reply_to, BasicPublishOptions::default(), body, properties)
            .await?
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.basic_ack(delivery_tag, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.basic_nack(
            delivery_tag,
            BasicNackOptions {
                requeue: false,
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded and there was nowhere to reply.
    Acknowledged,
    /// Handler succeeded and the reply was published.
    Replied,
    /// Handler or reply publish failed; the delivery was nacked.
    Rejected,
}

/// Run `handler` on `delivery` and settle it on `channel` exactly once.
pub async fn process_delivery<C: DeliveryChannel>(
    channel: &C,
    queue: &str,
    handler: &MessageHandler,
    delivery: Delivery,
    budget: Duration,
) -> DeliveryOutcome {
    let deadline = Instant::now() + budget;
    let delivery_tag = delivery.delivery_tag;
    let reply_to = delivery.reply_to.clone();
    let correlation_id = delivery.correlation_id.clone();

    info!(
        queue = %queue,
        delivery_tag = delivery_tag,
        correlation_id = ?correlation_id,
        body_length = delivery.body.len(),
        "rabbitmq_message_received"
    );

    let result = match timeout_at(deadline, handler(delivery)).await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::TimedOut(budget)),
    };

    let body = match result {
        Ok(body) => body,
        Err(e) => {
            warn!(
                queue = %queue,
                delivery_tag = delivery_tag,
                error = %e,
                "rabbitmq_handler_failed"
            );
            reject(channel, delivery_tag).await;
            return DeliveryOutcome::Rejected;
        }
    };

    let mut outcome = DeliveryOutcome::Acknowledged;
    if let Some(reply_to) = reply_to.as_deref() {
        let publish = channel.publish_reply(reply_to, correlation_id.as_deref(), &body);
        let published = match timeout_at(deadline, publish).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("reply publish timed out after {:?}", budget)),
        };

        if let Err(e) = published {
            error!(
                queue = %queue,
                delivery_tag = delivery_tag,
                reply_to = %reply_to,
                error = %e,
                "rabbitmq_reply_failed"
            );
            reject(channel, delivery_tag).await;
            return DeliveryOutcome::Rejected;
        }
        outcome = DeliveryOutcome::Replied;
    }

    if let Err(e) = channel.ack(delivery_tag).await {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
    } else {
        info!(
            queue = %queue,
            delivery_tag = delivery_tag,
            replied = outcome == DeliveryOutcome::Replied,
            "rabbitmq_message_completed"
        );
    }

    outcome
}

async fn reject<C: DeliveryChannel>(channel: &C, delivery_tag: u64) {
    if let Err(e) = channel.reject(delivery_tag).await {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_nack_failed");
    }
}
