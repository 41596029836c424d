//! RabbitMQ gateway.
//!
//! Owns the connection, declares topology, and runs a fixed pool of worker
//! loops per registered queue. Workers share the connection read-only and
//! each opens its own channel from it.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::handler::MessageHandler;
use super::topology;
use super::types::Delivery;
use super::worker::{process_delivery, DeliveryChannel, HANDLER_TIMEOUT};
use super::BrokerError;
use crate::config::TopologyConfig;

/// Deliveries of one consumer, ending when its channel closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, lapin::Error>>;

/// The connection-level operations the worker pool needs.
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: DeliveryChannel + 'static;

    /// Open a dedicated channel with a prefetch of one and start consuming
    /// `queue` on it under `consumer_tag`.
    fn open_consumer(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> impl Future<Output = Result<(Self::Channel, DeliveryStream), BrokerError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

impl BrokerConnection for Connection {
    type Channel = Channel;

    async fn open_consumer(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<(Channel, DeliveryStream), BrokerError> {
        let channel = self.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let deliveries = consumer.map(|delivery| delivery.map(Delivery::from));
        Ok((channel, Box::pin(deliveries)))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.status().connected() {
            Connection::close(self, 200, "Normal shutdown").await?;
        }
        Ok(())
    }
}

/// A queue and the handler its workers run. Fixed once `start` is called.
#[derive(Clone)]
pub struct ConsumerRegistration {
    pub queue_name: String,
    pub concurrency: usize,
    pub handler: MessageHandler,
}

impl ConsumerRegistration {
    /// Consumer tag of every worker for this queue, one per unit of concurrency.
    pub fn worker_tags(&self) -> Vec<String> {
        (0..self.concurrency)
            .map(|n| format!("{}-{}", self.queue_name, n))
            .collect()
    }
}

pub struct Broker<C = Connection> {
    connection: Arc<C>,
    consumers: Vec<ConsumerRegistration>,
    shutdown: watch::Sender<bool>,
}

impl Broker<Connection> {
    /// Connect to RabbitMQ. No reconnect is attempted later; a lost
    /// connection stops every worker.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        info!(url_length = url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default()).await?;

        info!("rabbitmq_connected");

        Ok(Self::with_connection(connection))
    }

    /// Declare exchanges, queues and bindings on a short-lived channel.
    pub async fn declare_topology(&self, topology: &TopologyConfig) -> Result<(), BrokerError> {
        let channel = self.connection.create_channel().await?;
        let result = topology::declare(&channel, topology).await;

        if let Err(e) = channel.close(200, "Topology declared").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        result
    }
}

impl<C: BrokerConnection> Broker<C> {
    pub fn with_connection(connection: C) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            connection: Arc::new(connection),
            consumers: Vec::new(),
            shutdown,
        }
    }

    /// Record a consumer. Nothing is consumed until `start`.
    pub fn register_consumer(
        &mut self,
        queue_name: impl Into<String>,
        concurrency: usize,
        handler: MessageHandler,
    ) {
        let registration = ConsumerRegistration {
            queue_name: queue_name.into(),
            concurrency: concurrency.max(1),
            handler,
        };

        info!(
            queue = %registration.queue_name,
            concurrency = registration.concurrency,
            "rabbitmq_consumer_registered"
        );

        self.consumers.push(registration);
    }

    /// Run every registered worker and wait until all of them have exited.
    ///
    /// Workers exit on `shutdown` or when their channel closes.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut workers = JoinSet::new();

        for registration in &self.consumers {
            for consumer_tag in registration.worker_tags() {
                workers.spawn(run_worker(
                    Arc::clone(&self.connection),
                    registration.queue_name.clone(),
                    consumer_tag,
                    Arc::clone(&registration.handler),
                    self.shutdown.subscribe(),
                ));
            }
        }

        info!(workers = workers.len(), "rabbitmq_consumers_started");

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "rabbitmq_worker_stopped"),
                Err(e) => error!(error = %e, "rabbitmq_worker_panicked"),
            }
        }

        info!("rabbitmq_consumers_stopped");
        Ok(())
    }

    /// Run the worker pool alongside `server` until the server returns, then
    /// shut the pool down. The pool stopping on its own is an error.
    ///
    /// The pool is shut down on every path, including a failed server.
    pub async fn serve_alongside<F, E>(self: Arc<Self>, server: F) -> anyhow::Result<()>
    where
        F: Future<Output = Result<(), E>>,
        E: Into<anyhow::Error>,
    {
        let mut workers = tokio::spawn({
            let broker = Arc::clone(&self);
            async move { broker.start().await }
        });
        let mut workers_done = false;

        let served = tokio::select! {
            result = server => {
                info!(ok = result.is_ok(), "server_stopped");
                result
                    .map_err(Into::<anyhow::Error>::into)
                    .context("Server error")
            }
            joined = &mut workers => {
                workers_done = true;
                // Workers only stop on their own when the connection is lost.
                error!(result = ?joined, "rabbitmq_consumers_exited");
                Err(anyhow!("RabbitMQ consumers stopped unexpectedly"))
            }
        };

        if let Err(e) = self.shutdown().await {
            warn!(error = %e, "rabbitmq_shutdown_failed");
        }
        if !workers_done {
            if let Err(e) = workers.await {
                warn!(error = %e, "rabbitmq_consumers_join_failed");
            }
        }

        served
    }

    /// Stop pulling new deliveries and close the connection.
    ///
    /// Deliveries received but not yet settled are redelivered by the broker.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        self.shutdown.send_replace(true);
        self.connection.close().await?;

        info!("rabbitmq_connection_closed");
        Ok(())
    }
}

/// One worker loop: its own channel, one delivery at a time.
async fn run_worker<C: BrokerConnection>(
    connection: Arc<C>,
    queue: String,
    consumer_tag: String,
    handler: MessageHandler,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    let (channel, mut deliveries) = connection.open_consumer(&queue, &consumer_tag).await?;

    info!(queue = %queue, consumer_tag = %consumer_tag, "rabbitmq_worker_started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => {
                info!(consumer_tag = %consumer_tag, "rabbitmq_worker_stopping");
                break;
            }
            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        process_delivery(&channel, &queue, &handler, delivery, HANDLER_TIMEOUT).await;
                    }
                    Some(Err(e)) => {
                        error!(consumer_tag = %consumer_tag, error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!(consumer_tag = %consumer_tag, "rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
