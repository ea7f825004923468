//! Cross-context publish/subscribe.
//!
//! Several contexts (windows, processes sharing one store) learn about each
//! other's mount changes and file events through a transport. Delivery is
//! best-effort and unordered across contexts; a context never receives its
//! own messages.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::stream::{self, BoxStream, StreamExt};
use mntfs_types::ChangeEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of one open context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextMessage {
    /// Reload the mount map from durable storage.
    MountsChanged,
    /// A change event observed in another context.
    Watch(ChangeEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: ContextId,
    pub message: ContextMessage,
}

/// A pub/sub channel shared by every context.
pub trait ContextTransport: Send + Sync {
    /// Send to every subscriber. Never blocks; may drop on overload.
    fn publish(&self, envelope: Envelope);

    /// Everything published from now on, including our own envelopes.
    fn subscribe(&self) -> BoxStream<'static, Envelope>;
}

/// In-process transport on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Envelope>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl ContextTransport for LocalBus {
    fn publish(&self, envelope: Envelope) {
        if self.sender.send(envelope).is_err() {
            tracing::trace!("No bus subscribers");
        }
    }

    fn subscribe(&self) -> BoxStream<'static, Envelope> {
        let rx = self.sender.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => return Some((envelope, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Bus subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

/// One context's view of the transport.
#[derive(Clone)]
pub struct BusEndpoint {
    id: ContextId,
    transport: Arc<dyn ContextTransport>,
}

impl fmt::Debug for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEndpoint").field("id", &self.id).finish()
    }
}

impl BusEndpoint {
    pub fn new(id: ContextId, transport: Arc<dyn ContextTransport>) -> Self {
        Self { id, transport }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn publish(&self, message: ContextMessage) {
        self.transport.publish(Envelope {
            origin: self.id,
            message,
        });
    }

    /// Messages from other contexts only.
    pub fn subscribe(&self) -> BoxStream<'static, ContextMessage> {
        let own = self.id;
        self.transport
            .subscribe()
            .filter_map(move |envelope| async move {
                (envelope.origin != own).then_some(envelope.message)
            })
            .boxed()
    }
}
