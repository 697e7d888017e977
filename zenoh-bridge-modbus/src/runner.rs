//! Per-entity tasks.
//!
//! Each task exclusively owns one entity. It restores the last-known state,
//! then alternates between scheduled updates and `/set` commands, publishing
//! the state after each cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use modbus_entities::{Entity, StateStore, StoredState, restore_entity, save_if_changed};
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};

use crate::error::{BridgeError, Result};
use crate::state::{BridgeEntity, parse_command};

/// Runs one entity until the task is aborted.
pub struct EntityRunner<E> {
    entity: E,
    session: Session,
    key_prefix: String,
    interval: Duration,
    store: Option<Arc<dyn StateStore>>,
}

impl<E: BridgeEntity> EntityRunner<E> {
    pub fn new(entity: E, session: Session, key_prefix: impl Into<String>, interval: Duration) -> Self {
        Self {
            entity,
            session,
            key_prefix: key_prefix.into(),
            interval,
            store: None,
        }
    }

    /// Restore from and persist to `store`.
    pub fn with_store(mut self, store: Option<Arc<dyn StateStore>>) -> Self {
        self.store = store;
        self
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.key_prefix, self.entity.name(), suffix)
    }

    /// Run the update/command loop.
    pub async fn run(mut self) -> Result<()> {
        if let Some(store) = &self.store {
            if restore_entity(&mut self.entity, store.as_ref()) {
                self.publish().await;
            }
        }

        let mut commands = if self.entity.accepts_commands() {
            let key = self.key("set");
            debug!(key = %key, "Subscribing to commands");
            Inbox::new(self.session.declare_subscriber(&key).await?)
        } else {
            Inbox::closed()
        };

        info!(
            entity = %self.entity.name(),
            interval_secs = self.interval.as_secs(),
            "Starting entity"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.entity.update().await;
                }
                sample = commands.next() => {
                    if sample.kind() == SampleKind::Delete {
                        continue;
                    }

                    let payload = sample.payload().to_bytes();
                    let text = String::from_utf8_lossy(&payload);
                    match parse_command(&text) {
                        Some(on) => {
                            info!(entity = %self.entity.name(), on, "Command received");
                            self.entity.command(on).await;
                        }
                        None => {
                            warn!(entity = %self.entity.name(), payload = %text, "Ignoring invalid command");
                            continue;
                        }
                    }
                }
            }

            self.publish().await;
            self.persist().await;
        }
    }

    async fn publish(&self) {
        let key = self.key("state");
        let payload = match serde_json::to_string(&self.entity.snapshot()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(entity = %self.entity.name(), error = %e, "Failed to serialize state");
                return;
            }
        };

        if let Err(e) = self.session.put(&key, payload).await {
            warn!(key = %key, error = %e, "Failed to publish state");
        }
    }

    async fn persist(&self) {
        let Some(store) = self.store.clone() else { return };
        let Some(state) = self.entity.stored_state() else { return };

        let name = self.entity.name().to_string();
        if let Err(e) = save_state(store, name.clone(), state).await {
            warn!(entity = %name, error = %e, "Failed to persist state");
        }
    }
}

/// Save a state on the blocking pool; the file store rewrites a whole document.
async fn save_state(store: Arc<dyn StateStore>, name: String, state: StoredState) -> Result<bool> {
    let saved = tokio::task::spawn_blocking(move || save_if_changed(store.as_ref(), &name, state))
        .await
        .map_err(|e| BridgeError::Persistence(e.to_string()))??;
    Ok(saved)
}

/// A source of command samples.
trait Receive: Send {
    type Item: Send;

    /// Next item, or `None` once the source is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Self::Item>> + Send;
}

impl Receive for Subscriber<FifoChannelHandler<Sample>> {
    type Item = Sample;

    async fn recv(&mut self) -> Option<Sample> {
        self.recv_async().await.ok()
    }
}

/// `/set` commands for one entity. Stays silent forever once closed.
struct Inbox<R> {
    receiver: Option<R>,
}

impl<R: Receive> Inbox<R> {
    fn new(receiver: R) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    fn closed() -> Self {
        Self { receiver: None }
    }

    async fn next(&mut self) -> R::Item {
        if let Some(receiver) = self.receiver.as_mut() {
            if let Some(item) = receiver.recv().await {
                return item;
            }
            warn!("Command subscriber closed");
            self.receiver = None;
        }
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_entities::MemoryStore;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    impl<T: Send> Receive for mpsc::Receiver<T> {
        type Item = T;

        async fn recv(&mut self) -> Option<T> {
            mpsc::Receiver::recv(self).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_goes_quiet_when_closed() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("on").await.unwrap();
        drop(tx);

        let mut inbox = Inbox::new(rx);
        assert_eq!(inbox.next().await, "on");

        let quiet = tokio::time::timeout(Duration::from_secs(60), inbox.next()).await;
        assert!(quiet.is_err());
        assert!(inbox.receiver.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_inbox_never_yields() {
        let mut inbox: Inbox<mpsc::Receiver<&str>> = Inbox::closed();
        let quiet = tokio::time::timeout(Duration::from_secs(60), inbox.next()).await;
        assert!(quiet.is_err());
    }

    /// Records the thread each save runs on.
    #[derive(Default)]
    struct ThreadStore {
        inner: MemoryStore,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl StateStore for ThreadStore {
        fn load(&self, entity: &str) -> Option<StoredState> {
            self.inner.load(entity)
        }

        fn save(&self, entity: &str, state: StoredState) -> std::result::Result<(), modbus_entities::StoreError> {
            self.threads.lock().push(std::thread::current().id());
            self.inner.save(entity, state)
        }
    }

    #[tokio::test]
    async fn test_save_state_runs_off_the_runtime_thread() {
        let store = Arc::new(ThreadStore::default());

        let saved = save_state(store.clone(), "pump".to_string(), StoredState::new("on"))
            .await
            .unwrap();
        assert!(saved);

        let unchanged = save_state(store.clone(), "pump".to_string(), StoredState::new("on"))
            .await
            .unwrap();
        assert!(!unchanged);

        let threads = store.threads.lock().clone();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
        assert_eq!(store.load("pump").unwrap().state, "on");
    }
}
