//! NATS subscriptions for inspection requests

use anyhow::{Context, Result};
use async_nats::{Client, Message};
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

/// Subscribes to every request subject and merges them into one stream
pub struct RequestConsumer {
    client: Client,
    subjects: Vec<String>,
}

impl RequestConsumer {
    pub fn new<I, S>(client: Client, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    /// Subscribe to all request subjects
    pub async fn subscribe(&self) -> Result<BoxStream<'static, Message>> {
        let mut subscribers = Vec::with_capacity(self.subjects.len());
        for subject in &self.subjects {
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .with_context(|| format!("Failed to subscribe to {}", subject))?;
            info!(subject = %subject, "Subscribed to request subject");
            subscribers.push(subscriber);
        }

        Ok(stream::select_all(subscribers).boxed())
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }
}

/// Wait for a free worker slot, giving up as soon as `shutdown` resolves.
///
/// Returns `None` on shutdown or when the semaphore has been closed.
pub async fn acquire_worker<F>(semaphore: Arc<Semaphore>, shutdown: F) -> Option<OwnedSemaphorePermit>
where
    F: Future,
{
    tokio::select! {
        _ = shutdown => None,
        permit = semaphore.acquire_owned() => permit.ok(),
    }
}
