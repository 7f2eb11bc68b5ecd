pub mod in_memory;

pub use in_memory::{InMemoryEntityStore, InMemoryQueueStore, InMemorySchedulingState};

use std::time::SystemTime;

use crate::models::{
    Address, AddressId, CoreError, Message, MessageId, NewQueueRecord, Payload, PayloadId, Pubkey,
    PubkeyId, QueueRecord,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Durable table of pending work. Every call is atomic on its own; callers
/// never need a transaction spanning several calls.
pub trait QueueStore: Send + Sync {
    fn list(&self) -> PersistenceResult<Vec<QueueRecord>>;

    fn insert(&self, record: &NewQueueRecord) -> PersistenceResult<QueueRecord>;

    /// Persists `attempts` and `last_attempt_at`. Fails with `NotFound` when
    /// the record was already deleted.
    fn update(&self, record: &QueueRecord) -> PersistenceResult<()>;

    /// Deleting a record that is already gone is not an error.
    fn delete(&self, record: &QueueRecord) -> PersistenceResult<()>;

    /// Inserts `follow_ups` and deletes the finished `record` as one unit:
    /// either all of it is applied or none of it is. Returns the inserted
    /// follow-ups. A finished record that is already gone is not an error.
    fn complete(
        &self,
        record: &QueueRecord,
        follow_ups: &[NewQueueRecord],
    ) -> PersistenceResult<Vec<QueueRecord>>;
}

/// Process-wide scheduling timestamps. Unset values read as the unix epoch.
pub trait SchedulingStateStore: Send + Sync {
    fn last_message_check_time(&self) -> PersistenceResult<SystemTime>;

    fn set_last_message_check_time(&self, at: SystemTime) -> PersistenceResult<()>;

    fn last_database_clean_time(&self) -> PersistenceResult<SystemTime>;

    fn set_last_database_clean_time(&self, at: SystemTime) -> PersistenceResult<()>;
}

/// Lookups over entities owned by the rest of the client. `None` means the
/// entity does not exist (usually because the user deleted it).
pub trait EntityStore: Send + Sync {
    fn message(&self, id: MessageId) -> PersistenceResult<Option<Message>>;

    fn update_message(&self, message: &Message) -> PersistenceResult<()>;

    fn address(&self, id: AddressId) -> PersistenceResult<Option<Address>>;

    fn list_addresses(&self) -> PersistenceResult<Vec<Address>>;

    fn pubkey(&self, id: PubkeyId) -> PersistenceResult<Option<Pubkey>>;

    fn payload(&self, id: PayloadId) -> PersistenceResult<Option<Payload>>;
}
