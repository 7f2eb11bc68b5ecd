pub mod entity;
pub mod error;
pub mod queue;

pub use entity::{
    Address, AddressId, Message, MessageId, MessageStatus, Payload, PayloadId, Pubkey, PubkeyId,
};
pub use error::{CoreError, CoreErrorKind};
pub use queue::{NewQueueRecord, QueueRecord, QueueRecordId, RecordTask, TaskType};
