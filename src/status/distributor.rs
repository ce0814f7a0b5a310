use std::collections::HashMap;
use std::hash::{BuildHasher as _, RandomState};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::SwapUpdate;

const SHARD_COUNT: usize = 16;
const DEFAULT_SINK_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("swap not found: {0}")]
    NotFound(String),

    #[error("status event bus closed")]
    BusClosed,
}

/// Status change emitted by swap processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub swap_id: String,
    pub update: SwapUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

/// Live feed of updates for one swap. Carries the status that was cached
/// when the subscription was registered.
#[derive(Debug)]
pub struct Subscription {
    swap_id: String,
    handle: SubscriptionHandle,
    current: SwapUpdate,
    receiver: mpsc::Receiver<SwapUpdate>,
}

impl Subscription {
    pub fn swap_id(&self) -> &str {
        &self.swap_id
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    pub fn current(&self) -> &SwapUpdate {
        &self.current
    }

    pub async fn recv(&mut self) -> Option<SwapUpdate> {
        self.receiver.recv().await
    }

    pub fn into_parts(
        self,
    ) -> (SubscriptionHandle, SwapUpdate, mpsc::Receiver<SwapUpdate>) {
        (self.handle, self.current, self.receiver)
    }
}

struct Sink {
    handle: SubscriptionHandle,
    sender: mpsc::Sender<SwapUpdate>,
}

#[derive(Default)]
struct Shard {
    statuses: HashMap<String, SwapUpdate>,
    sinks: HashMap<String, Vec<Sink>>,
}

/// Latest status per swap plus the subscribers waiting for changes.
///
/// Swap ids are spread over independently locked shards. Caching an update
/// and pushing it to subscribers happen under the same shard lock, so
/// subscribers of one swap observe updates in `on_update` order.
/// A subscriber whose buffer is full is dropped rather than waited on.
pub struct StatusDistributor {
    shards: Vec<Mutex<Shard>>,
    hasher: RandomState,
    sink_capacity: usize,
}

impl Default for StatusDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDistributor {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(Shard::default()))
                .collect(),
            hasher: RandomState::new(),
            sink_capacity: DEFAULT_SINK_CAPACITY,
        }
    }

    /// Number of undelivered updates a subscriber may hold before it is dropped.
    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity.max(1);
        self
    }

    pub fn with_table(table: HashMap<String, SwapUpdate>) -> Self {
        let distributor = Self::new();
        distributor.seed(table);
        distributor
    }

    /// Installs reconciled statuses without notifying anyone.
    pub fn seed(&self, table: HashMap<String, SwapUpdate>) {
        for (swap_id, update) in table {
            self.shard(&swap_id).statuses.insert(swap_id, update);
        }
    }

    fn shard(&self, swap_id: &str) -> MutexGuard<'_, Shard> {
        let idx = (self.hasher.hash_one(swap_id) as usize) % self.shards.len();
        self.shards[idx].lock().expect("status shard mutex poisoned")
    }

    /// Replaces the cached status of `swap_id` and pushes `update` to its
    /// subscribers. Subscribers whose receiver is gone or full are dropped.
    pub fn on_update(&self, swap_id: &str, update: SwapUpdate) {
        let mut guard = self.shard(swap_id);
        let shard = &mut *guard;

        let drained = match shard.sinks.get_mut(swap_id) {
            Some(sinks) => {
                sinks.retain(|sink| match sink.sender.try_send(update.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(%swap_id, handle = %sink.handle.0, "subscriber lagging, dropped");
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(%swap_id, handle = %sink.handle.0, "subscriber disconnected");
                        false
                    }
                });
                sinks.is_empty()
            }
            None => false,
        };
        if drained {
            shard.sinks.remove(swap_id);
        }

        shard.statuses.insert(swap_id.to_string(), update);
    }

    /// Registers a new subscriber. Fails for swaps without a cached status.
    pub fn subscribe(&self, swap_id: &str) -> Result<Subscription, StatusError> {
        let mut guard = self.shard(swap_id);
        let shard = &mut *guard;

        let current = shard
            .statuses
            .get(swap_id)
            .cloned()
            .ok_or_else(|| StatusError::NotFound(swap_id.to_string()))?;

        let handle = SubscriptionHandle(Uuid::new_v4());
        let (sender, receiver) = mpsc::channel(self.sink_capacity);
        shard
            .sinks
            .entry(swap_id.to_string())
            .or_default()
            .push(Sink { handle, sender });

        tracing::debug!(%swap_id, handle = %handle.0, "subscriber registered");
        Ok(Subscription {
            swap_id: swap_id.to_string(),
            handle,
            current,
            receiver,
        })
    }

    /// Removes a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, swap_id: &str, handle: SubscriptionHandle) -> bool {
        let mut guard = self.shard(swap_id);
        let Some(sinks) = guard.sinks.get_mut(swap_id) else {
            return false;
        };

        let before = sinks.len();
        sinks.retain(|sink| sink.handle != handle);
        let removed = sinks.len() != before;
        if sinks.is_empty() {
            guard.sinks.remove(swap_id);
        }

        if removed {
            tracing::debug!(%swap_id, handle = %handle.0, "subscriber removed");
        }
        removed
    }

    pub fn get_status(&self, swap_id: &str) -> Option<SwapUpdate> {
        self.shard(swap_id).statuses.get(swap_id).cloned()
    }

    pub fn subscriber_count(&self, swap_id: &str) -> usize {
        self.shard(swap_id).sinks.get(swap_id).map_or(0, Vec::len)
    }

    /// Number of swaps with a cached status.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("status shard mutex poisoned").statuses.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the task that applies published events in order and returns
    /// the publishing half. The task ends once every publisher is dropped.
    pub fn spawn_event_bus(self: &Arc<Self>) -> (StatusPublisher, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StatusEvent>();
        let distributor = Arc::clone(self);

        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                distributor.on_update(&event.swap_id, event.update);
            }
            tracing::debug!("status event bus closed");
        });

        (StatusPublisher { sender }, task)
    }
}

/// Sending half of the status event bus, handed to swap processing.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusPublisher {
    pub fn publish(&self, swap_id: impl Into<String>, update: SwapUpdate) -> Result<(), StatusError> {
        self.sender
            .send(StatusEvent {
                swap_id: swap_id.into(),
                update,
            })
            .map_err(|_| StatusError::BusClosed)
    }
}
