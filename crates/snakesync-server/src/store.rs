use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use snakesync_core::game_state::GameState;
use snakesync_core::gateway::{GatewayError, SessionHandle, SyncGateway};
use snakesync_core::geometry::Point;
use snakesync_core::record::{RecordField, SessionFields, SessionRecord};
use snakesync_core::time::unix_seconds;

/// Collection holding one record per session.
pub const SNAKES_PATH: &str = "game/snakes";

/// Location of the shared fruit position.
pub const FRUIT_PATH: &str = "game/config/fruit";

/// Default maximum number of writes kept in the log before the oldest are evicted.
const DEFAULT_MAX_STORED_WRITES: usize = 1000;

/// Default number of published records kept before ended ones are evicted.
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Default broadcast channel capacity for write fan-out.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// What a single write did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreChange {
    /// First write to a session; carries the whole record.
    Created { record: SessionRecord },
    /// Record contents after the write was merged.
    Updated { record: SessionRecord },
    Fruit { position: Point },
}

/// One entry of the append-only write log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreWrite {
    pub seq: u64,
    pub path: String,
    pub change: StoreChange,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub sessions: usize,
    /// Allocated but not yet written by their engine.
    pub pending_sessions: usize,
    pub active_sessions: usize,
    pub ended_sessions: usize,
    pub total_writes: u64,
    pub connected_clients: usize,
    pub fruit: Option<Point>,
}

struct StoreInner {
    records: BTreeMap<String, SessionRecord>,
    /// Published keys, oldest first.
    order: VecDeque<String>,
    /// Allocated records that have not been written yet. Not visible to readers.
    pending: HashMap<String, SessionRecord>,
    fruit: Option<Point>,
    log: VecDeque<StoreWrite>,
    next_seq: u64,
}

/// In-memory shared store with a bounded write log and broadcast fan-out.
///
/// Session records live under [`SNAKES_PATH`], the fruit under [`FRUIT_PATH`].
/// Engines talk to it through a [`StoreClient`].
///
/// A new record stays pending until its first write, which publishes it as
/// [`StoreChange::Created`]. A pending record that is ended before that is
/// discarded. Once more than `max_records` are published, the oldest ended
/// ones are evicted.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    broadcast_tx: broadcast::Sender<StoreWrite>,
    max_stored_writes: usize,
    max_records: usize,
    next_client_id: AtomicU64,
    connected_clients: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(
            DEFAULT_MAX_STORED_WRITES,
            DEFAULT_MAX_RECORDS,
            DEFAULT_BROADCAST_CAPACITY,
        )
    }

    pub fn with_capacity(
        max_stored_writes: usize,
        max_records: usize,
        broadcast_capacity: usize,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            inner: Mutex::new(StoreInner {
                records: BTreeMap::new(),
                order: VecDeque::new(),
                pending: HashMap::new(),
                fruit: None,
                log: VecDeque::new(),
                next_seq: 1,
            }),
            broadcast_tx,
            max_stored_writes,
            max_records,
            next_client_id: AtomicU64::new(1),
            connected_clients: AtomicUsize::new(0),
        }
    }

    /// Open a client connection. Its disconnect fallbacks fire when it is dropped.
    pub fn connect(self: &Arc<Self>) -> StoreClient {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(client_id = id, "Store client connected");
        StoreClient {
            id,
            store: Arc::clone(self),
            fallbacks: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, GatewayError> {
        self.inner
            .lock()
            .map_err(|_| GatewayError::Unavailable("store lock poisoned".to_string()))
    }

    /// Append to the log and notify subscribers. Called with the lock held so
    /// subscribers observe writes in `seq` order.
    fn append(&self, inner: &mut StoreInner, path: String, change: StoreChange) {
        let write = StoreWrite {
            seq: inner.next_seq,
            path,
            change,
        };
        inner.next_seq += 1;
        let _ = self.broadcast_tx.send(write.clone());
        inner.log.push_back(write);
        while inner.log.len() > self.max_stored_writes {
            inner.log.pop_front();
        }
    }

    /// Allocate a pending record. Nothing is written until the first update.
    pub fn create_record(&self, player_id: &str) -> Result<SessionHandle, GatewayError> {
        let handle = SessionHandle::generate();
        let record = SessionRecord::new(player_id, unix_seconds());
        self.lock()?
            .pending
            .insert(handle.key().to_string(), record);
        Ok(handle)
    }

    pub fn update_record(
        &self,
        handle: &SessionHandle,
        fields: &SessionFields,
    ) -> Result<(), GatewayError> {
        self.modify_record(handle, |record| record.apply(fields))
    }

    pub fn set_record_field(
        &self,
        handle: &SessionHandle,
        field: RecordField,
    ) -> Result<(), GatewayError> {
        self.modify_record(handle, |record| record.apply_field(field))
    }

    fn modify_record(
        &self,
        handle: &SessionHandle,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<(), GatewayError> {
        let mut inner = self.lock()?;
        let key = handle.key();

        if let Some(record) = inner.records.get_mut(key) {
            f(record);
            let record = record.clone();
            let ended = record.state == GameState::Ended;
            self.append(&mut inner, record_path(handle), StoreChange::Updated { record });
            if ended {
                self.evict_ended(&mut inner);
            }
            return Ok(());
        }

        let Some(mut record) = inner.pending.remove(key) else {
            return Err(GatewayError::UnknownSession(key.to_string()));
        };
        f(&mut record);
        if record.state == GameState::Ended {
            tracing::debug!(session_id = %handle, "Discarding session ended before its first write");
            return Ok(());
        }
        inner.records.insert(key.to_string(), record.clone());
        inner.order.push_back(key.to_string());
        self.append(&mut inner, record_path(handle), StoreChange::Created { record });
        self.evict_ended(&mut inner);
        Ok(())
    }

    /// Drop the oldest ended records while more than `max_records` are kept.
    /// Records still in play are never evicted.
    fn evict_ended(&self, inner: &mut StoreInner) {
        while inner.records.len() > self.max_records {
            let StoreInner { records, order, .. } = &mut *inner;
            let Some(pos) = order
                .iter()
                .position(|key| records.get(key).is_some_and(|r| r.state == GameState::Ended))
            else {
                break;
            };
            if let Some(key) = order.remove(pos) {
                records.remove(&key);
                tracing::debug!(session_id = %key, "Evicted ended session record");
            }
        }
    }

    pub fn set_fruit(&self, position: Point) -> Result<(), GatewayError> {
        let mut inner = self.lock()?;
        inner.fruit = Some(position);
        self.append(&mut inner, FRUIT_PATH.to_string(), StoreChange::Fruit { position });
        Ok(())
    }

    pub fn fruit(&self) -> Result<Option<Point>, GatewayError> {
        Ok(self.lock()?.fruit)
    }

    pub fn record(&self, id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    /// Every session record keyed by session id.
    pub fn snapshot(&self) -> Result<BTreeMap<String, SessionRecord>, GatewayError> {
        Ok(self.lock()?.records.clone())
    }

    /// The most recent `count` writes, newest first.
    pub fn recent(&self, count: usize) -> Result<Vec<StoreWrite>, GatewayError> {
        Ok(self.lock()?.log.iter().rev().take(count).cloned().collect())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreWrite> {
        self.broadcast_tx.subscribe()
    }

    pub fn stats(&self) -> Result<StoreStats, GatewayError> {
        let inner = self.lock()?;
        let ended_sessions = inner
            .records
            .values()
            .filter(|r| r.state == GameState::Ended)
            .count();
        Ok(StoreStats {
            sessions: inner.records.len(),
            pending_sessions: inner.pending.len(),
            active_sessions: inner.records.len() - ended_sessions,
            ended_sessions,
            total_writes: inner.next_seq - 1,
            connected_clients: self.connected_clients.load(Ordering::Relaxed),
            fruit: inner.fruit,
        })
    }
}

fn record_path(handle: &SessionHandle) -> String {
    format!("{SNAKES_PATH}/{}", handle.key())
}

/// One engine's connection to a [`MemoryStore`].
///
/// Dropping the client is treated as a disconnect: every registered fallback is
/// applied to its record.
pub struct StoreClient {
    id: u64,
    store: Arc<MemoryStore>,
    fallbacks: Mutex<Vec<(SessionHandle, SessionFields)>>,
}

impl StoreClient {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn fallbacks(
        &self,
    ) -> Result<MutexGuard<'_, Vec<(SessionHandle, SessionFields)>>, GatewayError> {
        self.fallbacks
            .lock()
            .map_err(|_| GatewayError::Unavailable("fallback lock poisoned".to_string()))
    }
}

impl SyncGateway for StoreClient {
    fn create_session(&self, player_id: &str) -> SessionHandle {
        match self.store.create_record(player_id) {
            Ok(handle) => handle,
            Err(e) => {
                // Writes against this handle will report UnknownSession.
                let handle = SessionHandle::generate();
                tracing::warn!(client_id = self.id, session_id = %handle, error = %e, "Failed to create session record");
                handle
            },
        }
    }

    fn update(&self, handle: &SessionHandle, fields: SessionFields) -> Result<(), GatewayError> {
        self.store.update_record(handle, &fields)
    }

    fn register_disconnect_fallback(
        &self,
        handle: &SessionHandle,
        fields: SessionFields,
    ) -> Result<(), GatewayError> {
        let mut fallbacks = self.fallbacks()?;
        match fallbacks.iter_mut().find(|(h, _)| h == handle) {
            Some(entry) => entry.1 = fields,
            None => fallbacks.push((handle.clone(), fields)),
        }
        Ok(())
    }

    fn cancel_disconnect_fallback(&self, handle: &SessionHandle) -> Result<(), GatewayError> {
        self.fallbacks()?.retain(|(h, _)| h != handle);
        Ok(())
    }

    fn set_field(&self, handle: &SessionHandle, field: RecordField) -> Result<(), GatewayError> {
        self.store.set_record_field(handle, field)
    }

    fn set_fruit_position(&self, position: Point) -> Result<(), GatewayError> {
        self.store.set_fruit(position)
    }

    fn read_fruit_position(&self) -> Option<Point> {
        self.store.fruit().ok().flatten()
    }
}

impl Drop for StoreClient {
    fn drop(&mut self) {
        let fallbacks = std::mem::take(
            &mut *self
                .fallbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (handle, fields) in &fallbacks {
            if let Err(e) = self.store.update_record(handle, fields) {
                tracing::warn!(client_id = self.id, session_id = %handle, error = %e, "Disconnect fallback failed");
            }
        }
        self.store.connected_clients.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(
            client_id = self.id,
            fallbacks = fallbacks.len(),
            "Store client disconnected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snakesync_core::geometry::{BoardSize, Direction};
    use snakesync_core::reducer::PlayState;

    fn running_fields() -> SessionFields {
        let mut state = PlayState::initial("alice", BoardSize::new(10, 10), 2);
        state.state = GameState::Running;
        state.direction = Some(Direction::Up);
        state.score = 3;
        SessionFields::from_state(&state, 99).unwrap()
    }

    /// Create and publish a running record.
    fn published(store: &MemoryStore, player_id: &str) -> SessionHandle {
        let handle = store.create_record(player_id).unwrap();
        store.update_record(&handle, &running_fields()).unwrap();
        handle
    }

    fn end(store: &MemoryStore, handle: &SessionHandle) {
        store
            .set_record_field(handle, RecordField::State(GameState::Ended))
            .unwrap();
    }

    #[test]
    fn record_is_hidden_until_first_write() {
        let store = MemoryStore::new();
        let handle = store.create_record("alice").unwrap();

        assert_eq!(store.record(handle.key()).unwrap(), None);
        assert!(store.snapshot().unwrap().is_empty());
        assert!(store.recent(10).unwrap().is_empty());
        assert_eq!(store.stats().unwrap().pending_sessions, 1);

        store.update_record(&handle, &running_fields()).unwrap();
        let record = store.record(handle.key()).unwrap().unwrap();
        assert_eq!(record.player_id, "alice");
        assert_eq!(record.state, GameState::Running);
        assert_eq!(record.score, 3);
        assert_eq!(record.updated, 99);
        assert_eq!(record.decode_snake().unwrap().len(), 2);

        let writes = store.recent(10).unwrap();
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0].change, StoreChange::Created { .. }));
        assert_eq!(store.stats().unwrap().pending_sessions, 0);
    }

    #[test]
    fn later_writes_are_updates() {
        let store = MemoryStore::new();
        let handle = published(&store, "alice");
        end(&store, &handle);

        let writes = store.recent(10).unwrap();
        assert_eq!(writes.len(), 2);
        match &writes[0].change {
            StoreChange::Updated { record } => {
                assert_eq!(record.state, GameState::Ended);
                assert_eq!(record.score, 3);
            },
            other => panic!("Expected Updated, got: {other:?}"),
        }
    }

    #[test]
    fn session_ended_before_first_write_is_discarded() {
        let store = MemoryStore::new();
        let handle = store.create_record("alice").unwrap();
        end(&store, &handle);

        assert_eq!(store.record(handle.key()).unwrap(), None);
        assert!(store.recent(10).unwrap().is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.pending_sessions, 0);
        // The handle is gone for good.
        assert!(store.update_record(&handle, &running_fields()).is_err());
    }

    #[test]
    fn writes_to_unknown_session_fail() {
        let store = MemoryStore::new();
        let handle = SessionHandle::from_key("missing");
        let err = store.update_record(&handle, &SessionFields::ended()).unwrap_err();
        assert_eq!(err, GatewayError::UnknownSession("missing".to_string()));
        assert!(store.recent(10).unwrap().is_empty());
    }

    #[test]
    fn write_paths() {
        let store = MemoryStore::new();
        let handle = published(&store, "alice");
        store.set_fruit(Point::new(1, 2)).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent[0].path, FRUIT_PATH);
        assert_eq!(recent[0].seq, 2);
        assert_eq!(recent[1].path, format!("game/snakes/{handle}"));
        assert_eq!(store.fruit().unwrap(), Some(Point::new(1, 2)));
    }

    #[test]
    fn log_is_bounded() {
        let store = MemoryStore::with_capacity(3, 16, 16);
        for i in 0..5 {
            store.set_fruit(Point::new(i, 0)).unwrap();
        }
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].seq, 5);
        assert_eq!(recent[2].seq, 3);
        assert_eq!(store.stats().unwrap().total_writes, 5);
    }

    #[test]
    fn oldest_ended_records_are_evicted() {
        let store = MemoryStore::with_capacity(100, 2, 16);
        let a = published(&store, "alice");
        let b = published(&store, "bob");
        end(&store, &a);
        end(&store, &b);

        let c = published(&store, "carol");
        assert_eq!(store.record(a.key()).unwrap(), None);
        assert!(store.record(b.key()).unwrap().is_some());
        assert!(store.record(c.key()).unwrap().is_some());
        assert_eq!(store.stats().unwrap().sessions, 2);
    }

    #[test]
    fn records_in_play_are_never_evicted() {
        let store = MemoryStore::with_capacity(100, 1, 16);
        let a = published(&store, "alice");
        let b = published(&store, "bob");
        assert_eq!(store.snapshot().unwrap().len(), 2);

        // Once one ends the store shrinks back to its limit.
        end(&store, &a);
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(b.key()));
    }

    #[test]
    fn dropping_client_applies_fallbacks() {
        let store = Arc::new(MemoryStore::new());
        let client = store.connect();
        let handle = client.create_session("alice");
        client.update(&handle, running_fields()).unwrap();
        client
            .register_disconnect_fallback(&handle, SessionFields::ended())
            .unwrap();
        assert_eq!(store.stats().unwrap().connected_clients, 1);

        drop(client);

        let record = store.record(handle.key()).unwrap().unwrap();
        assert_eq!(record.state, GameState::Ended);
        // Fallback only touches the fields it names.
        assert_eq!(record.score, 3);
        assert_eq!(store.stats().unwrap().connected_clients, 0);
    }

    #[test]
    fn fallback_registration_replaces_previous() {
        let store = Arc::new(MemoryStore::new());
        let client = store.connect();
        let handle = client.create_session("alice");
        client.update(&handle, running_fields()).unwrap();
        client
            .register_disconnect_fallback(&handle, SessionFields::ended())
            .unwrap();
        client
            .register_disconnect_fallback(
                &handle,
                SessionFields {
                    score: Some(7),
                    ..SessionFields::default()
                },
            )
            .unwrap();
        drop(client);

        let record = store.record(handle.key()).unwrap().unwrap();
        assert_eq!(record.state, GameState::Running);
        assert_eq!(record.score, 7);
    }

    #[test]
    fn cancelled_fallback_does_not_fire() {
        let store = Arc::new(MemoryStore::new());
        let client = store.connect();
        let handle = client.create_session("alice");
        client.update(&handle, running_fields()).unwrap();
        client
            .register_disconnect_fallback(&handle, SessionFields::ended())
            .unwrap();
        client.cancel_disconnect_fallback(&handle).unwrap();
        let writes_before = store.stats().unwrap().total_writes;

        drop(client);

        assert_eq!(store.stats().unwrap().total_writes, writes_before);
        let record = store.record(handle.key()).unwrap().unwrap();
        assert_eq!(record.state, GameState::Running);
    }

    #[test]
    fn restarts_leave_no_stale_fallbacks() {
        use snakesync_core::input::{InputCode, InputEvent};
        use snakesync_core::session::{SessionConfig, SessionOrchestrator};

        let store = Arc::new(MemoryStore::with_capacity(100, 10, 16));
        let client = Arc::new(store.connect());
        let config = SessionConfig {
            player_id: "alice".to_string(),
            board: BoardSize::new(10, 10),
            initial_length: 3,
            seed: Some(5),
        };
        let mut orchestrator =
            SessionOrchestrator::new(config, Arc::clone(&client) as Arc<dyn SyncGateway>)
                .unwrap();

        for _ in 0..200 {
            orchestrator.handle_input(InputEvent::Key(InputCode::Enter));
            orchestrator.handle_input(InputEvent::Key(InputCode::ArrowUp));
            orchestrator.tick();
        }
        orchestrator.finish();
        assert!(client.fallbacks().unwrap().is_empty());

        let stats = store.stats().unwrap();
        assert!(stats.sessions <= 10, "kept {} records", stats.sessions);
        assert_eq!(stats.pending_sessions, 0);
        let writes_before = stats.total_writes;

        drop(orchestrator);
        drop(client);
        assert_eq!(store.stats().unwrap().total_writes, writes_before);
    }

    #[test]
    fn client_reads_shared_fruit() {
        let store = Arc::new(MemoryStore::new());
        let a = store.connect();
        let b = store.connect();
        assert_eq!(b.read_fruit_position(), None);
        a.set_fruit_position(Point::new(3, 4)).unwrap();
        assert_eq!(b.read_fruit_position(), Some(Point::new(3, 4)));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn stats_count_sessions() {
        let store = Arc::new(MemoryStore::new());
        let client = store.connect();
        let a = client.create_session("alice");
        client.update(&a, running_fields()).unwrap();
        let b = client.create_session("bob");
        client.update(&b, running_fields()).unwrap();
        let _pending = client.create_session("carol");
        client
            .set_field(&a, RecordField::State(GameState::Ended))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.pending_sessions, 1);
        assert_eq!(stats.ended_sessions, 1);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(store.snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_writes_in_order() {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe();
        let client = store.connect();
        let handle = client.create_session("alice");
        client.update(&handle, running_fields()).unwrap();
        client
            .set_field(&handle, RecordField::State(GameState::Ended))
            .unwrap();
        client.set_fruit_position(Point::new(0, 0)).unwrap();

        let first = rx.recv().await.unwrap();
        match first.change {
            StoreChange::Created { record } => assert_eq!(record.state, GameState::Running),
            other => panic!("Expected Created, got: {other:?}"),
        }
        let second = rx.recv().await.unwrap();
        match second.change {
            StoreChange::Updated { record } => assert_eq!(record.state, GameState::Ended),
            other => panic!("Expected Updated, got: {other:?}"),
        }
        let third = rx.recv().await.unwrap();
        assert_eq!(third.seq, 3);
        assert_eq!(third.path, FRUIT_PATH);
    }

    #[test]
    fn write_serializes_with_kind_tag() {
        let store = MemoryStore::new();
        store.set_fruit(Point::new(7, 8)).unwrap();
        let write = store.recent(1).unwrap().remove(0);
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(json["change"]["kind"], "fruit");
        assert_eq!(json["change"]["position"]["x"], 7);
        assert_eq!(json["path"], "game/config/fruit");
    }
}
