//! Exchange, queue and binding declaration.
//!
//! Declaration is all-or-nothing from the caller's point of view: the first
//! failure aborts and is returned, and startup is expected to stop there.

use std::future::Future;

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel, ExchangeKind,
};
use tracing::info;

use super::BrokerError;
use crate::config::{ExchangeConfig, QueueConfig, TopologyConfig};

/// Binding with its queue key resolved to the declared queue name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding<'a> {
    pub exchange: &'a str,
    pub queue: &'a str,
    pub routing_key: &'a str,
}

/// Map a configured exchange type onto lapin's kind.
pub fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind.to_ascii_lowercase().as_str() {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        _ => ExchangeKind::Custom(kind.to_string()),
    }
}

/// Queue arguments; dead-lettering through the default exchange when the
/// queue names a DLQ routing key.
pub fn queue_arguments(queue: &QueueConfig) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(routing_key) = queue.dead_letter_routing_key() {
        args.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(LongString::from("")),
        );
        args.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(LongString::from(routing_key)),
        );
    }
    args
}

/// Resolve every binding's queue key, failing on the first unknown key.
pub fn resolve_bindings(topology: &TopologyConfig) -> Result<Vec<ResolvedBinding<'_>>, BrokerError> {
    topology
        .bindings
        .iter()
        .map(|binding| {
            let queue = topology
                .queues
                .get(&binding.queue_key)
                .ok_or_else(|| BrokerError::UnknownQueueKey(binding.queue_key.clone()))?;
            Ok(ResolvedBinding {
                exchange: &binding.exchange,
                queue: &queue.name,
                routing_key: &binding.routing_key,
            })
        })
        .collect()
}

/// The declarations topology setup issues on a channel.
pub trait TopologyChannel: Send + Sync {
    fn declare_exchange(
        &self,
        exchange: &ExchangeConfig,
    ) -> impl Future<Output = Result<(), lapin::Error>> + Send;

    fn declare_queue(
        &self,
        queue: &QueueConfig,
    ) -> impl Future<Output = Result<(), lapin::Error>> + Send;

    fn bind_queue(
        &self,
        binding: &ResolvedBinding<'_>,
    ) -> impl Future<Output = Result<(), lapin::Error>> + Send;
}

impl TopologyChannel for Channel {
    async fn declare_exchange(&self, exchange: &ExchangeConfig) -> Result<(), lapin::Error> {
        self.exchange_declare(
            &exchange.name,
            exchange_kind(&exchange.kind),
            ExchangeDeclareOptions {
                durable: exchange.durable,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
    }

    async fn declare_queue(&self, queue: &QueueConfig) -> Result<(), lapin::Error> {
        self.queue_declare(
            &queue.name,
            QueueDeclareOptions {
                durable: queue.durable,
                ..Default::default()
            },
            queue_arguments(queue),
        )
        .await?;
        Ok(())
    }

    async fn bind_queue(&self, binding: &ResolvedBinding<'_>) -> Result<(), lapin::Error> {
        self.queue_bind(
            binding.queue,
            binding.exchange,
            binding.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
    }
}

/// Declare exchanges, then queues, then bindings on `channel`.
///
/// Bindings are resolved before anything is declared, so a bad queue key
/// leaves the broker untouched. The first failed declaration stops the rest.
pub async fn declare<C: TopologyChannel>(
    channel: &C,
    topology: &TopologyConfig,
) -> Result<(), BrokerError> {
    let bindings = resolve_bindings(topology)?;

    for exchange in &topology.exchanges {
        channel
            .declare_exchange(exchange)
            .await
            .map_err(|source| BrokerError::Declare {
                target: format!("exchange {}", exchange.name),
                source,
            })?;
    }

    for queue in topology.queues.values() {
        channel
            .declare_queue(queue)
            .await
            .map_err(|source| BrokerError::Declare {
                target: format!("queue {}", queue.name),
                source,
            })?;
    }

    for binding in &bindings {
        channel
            .bind_queue(binding)
            .await
            .map_err(|source| BrokerError::Declare {
                target: format!("binding {} -> {}", binding.exchange, binding.queue),
                source,
            })?;
    }

    info!(
        exchanges = topology.exchanges.len(),
        queues = topology.queues.len(),
        bindings = bindings.len(),
        "rabbitmq_topology_declared"
    );

    Ok(())
}
