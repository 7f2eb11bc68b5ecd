//! Boundary to the protocol layer that does the actual network, crypto and
//! proof-of-work for each task type.
//!
//! The dispatcher may run the same logical request twice: once on the fast
//! path at submission and again on a later sweep if the first attempt never
//! got to delete its record. Implementations must therefore be idempotent
//! with respect to anything externally visible, typically by checking a
//! persisted "already done" marker before sending.

use crate::models::{CoreError, Message, NewQueueRecord, Payload, Pubkey, QueueRecord};

pub type ExecutionResult<T> = Result<T, CoreError>;

/// Successful result of one executor operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskCompletion {
    /// Work that becomes due because this phase finished. Inserted into the
    /// queue before the finished record is removed.
    pub follow_ups: Vec<NewQueueRecord>,
    /// Messages newly received while processing this task.
    pub new_messages: usize,
}

impl TaskCompletion {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_follow_up(mut self, follow_up: NewQueueRecord) -> Self {
        self.follow_ups.push(follow_up);
        self
    }

    pub fn with_new_messages(mut self, count: usize) -> Self {
        self.new_messages = count;
        self
    }
}

pub trait ProtocolExecutor: Send + Sync {
    fn send_message(
        &self,
        record: &QueueRecord,
        message: &Message,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    fn process_outgoing_message(
        &self,
        record: &QueueRecord,
        message: &Message,
        pubkey: &Pubkey,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    fn disseminate_message(
        &self,
        record: &QueueRecord,
        payload: &Payload,
        pubkey: &Pubkey,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    fn disseminate_pubkey(
        &self,
        record: &QueueRecord,
        payload: &Payload,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    fn process_incoming_messages(&self) -> ExecutionResult<TaskCompletion>;

    fn send_acknowledgments(&self, record: &QueueRecord) -> ExecutionResult<TaskCompletion>;

    fn create_identity(
        &self,
        record: &QueueRecord,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    fn re_disseminate_pubkeys(
        &self,
        record: &QueueRecord,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    /// Owns its own due-time bookkeeping. Any re-dissemination work it decides
    /// on is returned as follow-ups.
    fn check_if_pubkey_dissemination_is_due(
        &self,
        do_pow: bool,
    ) -> ExecutionResult<TaskCompletion>;

    /// Returns the number of new messages fetched.
    fn check_for_messages_and_send_acks(&self) -> ExecutionResult<usize>;
}

pub trait NotificationBridge: Send + Sync {
    fn notify_new_messages(&self, count: usize);
}

pub trait DatabaseCleaner: Send + Sync {
    fn clean_database(&self) -> ExecutionResult<()>;
}

/// Bridge for hosts that render no notifications.
pub struct NoopNotificationBridge;

impl NotificationBridge for NoopNotificationBridge {
    fn notify_new_messages(&self, count: usize) {
        tracing::debug!(count, "new messages received; no notification bridge installed");
    }
}

pub struct NoopDatabaseCleaner;

impl DatabaseCleaner for NoopDatabaseCleaner {
    fn clean_database(&self) -> ExecutionResult<()> {
        Ok(())
    }
}
