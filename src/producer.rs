//! NATS reply publishing

use crate::handler::Reply;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::{debug, warn};

/// Sends handler replies back to the requester's inbox
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a reply. Requests sent without a reply subject are only logged.
    pub async fn publish(&self, reply_to: Option<Subject>, reply: Reply) -> Result<()> {
        let operation = reply.operation.map_or("unknown", |op| op.as_str());
        let Some(reply_to) = reply_to else {
            warn!(
                operation = operation,
                ok = reply.ok,
                "Request had no reply subject; dropping reply"
            );
            return Ok(());
        };

        let bytes = reply.payload.len();
        self.client.publish(reply_to.clone(), reply.payload.into()).await?;

        debug!(
            operation = operation,
            reply_to = %reply_to,
            ok = reply.ok,
            bytes = bytes,
            "Published reply"
        );
        Ok(())
    }

    /// Flush buffered replies before shutdown
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await?;
        Ok(())
    }
}
