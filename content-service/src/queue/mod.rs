//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Topology declaration from configuration
//! - A broker that runs a fixed worker pool per queue
//! - Request/reply settlement of each delivery
//!
//! ## Flow
//!
//! ```text
//! client → cv_token_request queue → worker → handler → reply_to queue
//!                    │
//!                    └─ rejected → dead-letter queue
//! ```

pub mod broker;
pub mod handler;
pub mod topology;
pub mod types;
pub mod worker;

use thiserror::Error;

pub use broker::{Broker, BrokerConnection, ConsumerRegistration, DeliveryStream};
pub use handler::{json_handler, HandlerError, HandlerResult, MessageHandler};
pub use topology::TopologyChannel;
pub use types::{CvTokenReply, CvTokenRequest, Delivery};
pub use worker::{process_delivery, DeliveryChannel, DeliveryOutcome, HANDLER_TIMEOUT};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to declare {target}: {source}")]
    Declare {
        target: String,
        #[source]
        source: lapin::Error,
    },

    #[error("binding references unknown queue key '{0}'")]
    UnknownQueueKey(String),
}
