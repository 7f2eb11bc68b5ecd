use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{
    Address, AddressId, CoreError, CoreErrorKind, Message, MessageId, NewQueueRecord, Payload,
    PayloadId, Pubkey, PubkeyId, QueueRecord, QueueRecordId, RecordTask,
};
use crate::persistence::{EntityStore, PersistenceResult, QueueStore, SchedulingStateStore};

#[derive(Default)]
pub struct InMemoryQueueStore {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    next_record_id: u64,
    records: BTreeMap<QueueRecordId, QueueRecord>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record verbatim, including rows this build cannot decode.
    pub fn restore(&self, record: QueueRecord) -> PersistenceResult<()> {
        let mut state = lock(&self.state, "queue store")?;
        state.next_record_id = state.next_record_id.max(record.id.0.saturating_add(1));
        state.records.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: QueueRecordId) -> PersistenceResult<Option<QueueRecord>> {
        let state = lock(&self.state, "queue store")?;
        Ok(state.records.get(&id).cloned())
    }
}

impl QueueStore for InMemoryQueueStore {
    fn list(&self) -> PersistenceResult<Vec<QueueRecord>> {
        let state = lock(&self.state, "queue store")?;
        Ok(state.records.values().cloned().collect())
    }

    fn insert(&self, record: &NewQueueRecord) -> PersistenceResult<QueueRecord> {
        let mut state = lock(&self.state, "queue store")?;
        Ok(state.insert(record))
    }

    fn update(&self, record: &QueueRecord) -> PersistenceResult<()> {
        let mut state = lock(&self.state, "queue store")?;
        let Some(existing) = state.records.get_mut(&record.id) else {
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!("queue record '{}' was not found for update", record.id.0),
            )
            .with_record(record.id));
        };
        existing.attempts = record.attempts;
        existing.last_attempt_at = record.last_attempt_at;
        Ok(())
    }

    fn delete(&self, record: &QueueRecord) -> PersistenceResult<()> {
        let mut state = lock(&self.state, "queue store")?;
        state.records.remove(&record.id);
        Ok(())
    }

    fn complete(
        &self,
        record: &QueueRecord,
        follow_ups: &[NewQueueRecord],
    ) -> PersistenceResult<Vec<QueueRecord>> {
        let mut state = lock(&self.state, "queue store")?;
        let inserted = follow_ups
            .iter()
            .map(|follow_up| state.insert(follow_up))
            .collect();
        state.records.remove(&record.id);
        Ok(inserted)
    }
}

impl QueueState {
    fn insert(&mut self, record: &NewQueueRecord) -> QueueRecord {
        let id = QueueRecordId(self.next_record_id);
        self.next_record_id = self.next_record_id.saturating_add(1);

        let stored = QueueRecord {
            id,
            task: RecordTask::Known(record.task_type),
            primary_ref: record.primary_ref,
            secondary_ref: record.secondary_ref,
            attempts: 0,
            last_attempt_at: None,
            created_at: record.created_at,
        };
        self.records.insert(id, stored.clone());
        stored
    }
}

#[derive(Default)]
pub struct InMemorySchedulingState {
    state: Mutex<SchedulingTimes>,
}

#[derive(Clone, Copy)]
struct SchedulingTimes {
    last_message_check: SystemTime,
    last_database_clean: SystemTime,
}

impl Default for SchedulingTimes {
    fn default() -> Self {
        Self {
            last_message_check: UNIX_EPOCH,
            last_database_clean: UNIX_EPOCH,
        }
    }
}

impl InMemorySchedulingState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingStateStore for InMemorySchedulingState {
    fn last_message_check_time(&self) -> PersistenceResult<SystemTime> {
        Ok(lock(&self.state, "scheduling state")?.last_message_check)
    }

    fn set_last_message_check_time(&self, at: SystemTime) -> PersistenceResult<()> {
        lock(&self.state, "scheduling state")?.last_message_check = at;
        Ok(())
    }

    fn last_database_clean_time(&self) -> PersistenceResult<SystemTime> {
        Ok(lock(&self.state, "scheduling state")?.last_database_clean)
    }

    fn set_last_database_clean_time(&self, at: SystemTime) -> PersistenceResult<()> {
        lock(&self.state, "scheduling state")?.last_database_clean = at;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEntityStore {
    state: Mutex<Entities>,
}

#[derive(Default)]
struct Entities {
    messages: BTreeMap<MessageId, Message>,
    addresses: BTreeMap<AddressId, Address>,
    pubkeys: BTreeMap<PubkeyId, Pubkey>,
    payloads: BTreeMap<PayloadId, Payload>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_message(&self, message: Message) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?
            .messages
            .insert(message.id, message);
        Ok(())
    }

    pub fn remove_message(&self, id: MessageId) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?.messages.remove(&id);
        Ok(())
    }

    pub fn put_address(&self, address: Address) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?
            .addresses
            .insert(address.id, address);
        Ok(())
    }

    pub fn remove_address(&self, id: AddressId) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?.addresses.remove(&id);
        Ok(())
    }

    pub fn put_pubkey(&self, pubkey: Pubkey) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?
            .pubkeys
            .insert(pubkey.id, pubkey);
        Ok(())
    }

    pub fn put_payload(&self, payload: Payload) -> PersistenceResult<()> {
        lock(&self.state, "entity store")?
            .payloads
            .insert(payload.id, payload);
        Ok(())
    }
}

impl EntityStore for InMemoryEntityStore {
    fn message(&self, id: MessageId) -> PersistenceResult<Option<Message>> {
        Ok(lock(&self.state, "entity store")?.messages.get(&id).cloned())
    }

    fn update_message(&self, message: &Message) -> PersistenceResult<()> {
        let mut state = lock(&self.state, "entity store")?;
        let Some(existing) = state.messages.get_mut(&message.id) else {
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!("message '{}' was not found for update", message.id.0),
            ));
        };
        *existing = message.clone();
        Ok(())
    }

    fn address(&self, id: AddressId) -> PersistenceResult<Option<Address>> {
        Ok(lock(&self.state, "entity store")?.addresses.get(&id).cloned())
    }

    fn list_addresses(&self) -> PersistenceResult<Vec<Address>> {
        Ok(lock(&self.state, "entity store")?
            .addresses
            .values()
            .cloned()
            .collect())
    }

    fn pubkey(&self, id: PubkeyId) -> PersistenceResult<Option<Pubkey>> {
        Ok(lock(&self.state, "entity store")?.pubkeys.get(&id).cloned())
    }

    fn payload(&self, id: PayloadId) -> PersistenceResult<Option<Payload>> {
        Ok(lock(&self.state, "entity store")?.payloads.get(&id).cloned())
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> PersistenceResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("in-memory {name} mutex poisoned"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::TaskType;

    #[test]
    fn inserted_records_start_unattempted() {
        let store = InMemoryQueueStore::new();
        let record = store
            .insert(&NewQueueRecord::new(TaskType::SendMessage, UNIX_EPOCH).primary(7))
            .unwrap();

        assert_eq!(record.attempts, 0);
        assert_eq!(record.last_attempt_at, None);
        assert_eq!(record.primary_ref, Some(7));
        assert_eq!(store.list().unwrap(), vec![record]);
    }

    #[test]
    fn update_after_delete_reports_not_found() {
        let store = InMemoryQueueStore::new();
        let mut record = store
            .insert(&NewQueueRecord::new(TaskType::SendAcks, UNIX_EPOCH))
            .unwrap();
        store.delete(&record).unwrap();
        store.delete(&record).unwrap();

        record.attempts = 1;
        let error = store.update(&record).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::NotFound);
    }

    #[test]
    fn complete_swaps_finished_record_for_follow_ups() {
        let store = InMemoryQueueStore::new();
        let finished = store
            .insert(&NewQueueRecord::new(TaskType::ProcessOutgoingMessage, UNIX_EPOCH))
            .unwrap();

        let inserted = store
            .complete(
                &finished,
                &[
                    NewQueueRecord::new(TaskType::DisseminateMessage, UNIX_EPOCH).primary(1),
                    NewQueueRecord::new(TaskType::DisseminateMessage, UNIX_EPOCH).primary(2),
                ],
            )
            .unwrap();

        assert_eq!(inserted.len(), 2);
        assert_eq!(store.list().unwrap(), inserted);
        assert!(store.get(finished.id).unwrap().is_none());
    }

    #[test]
    fn scheduling_times_default_to_epoch() {
        let state = InMemorySchedulingState::new();
        assert_eq!(state.last_message_check_time().unwrap(), UNIX_EPOCH);

        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        state.set_last_database_clean_time(at).unwrap();
        assert_eq!(state.last_database_clean_time().unwrap(), at);
    }
}
