use crate::executor::{ExecutionResult, TaskCompletion};
use crate::models::{
    Address, AddressId, CoreError, CoreErrorKind, Message, MessageId, MessageStatus, NewQueueRecord,
    Payload, PayloadId, Pubkey, PubkeyId, QueueRecord, QueueRecordId, TaskType,
};
use crate::orchestration::EngineContext;
use crate::persistence::PersistenceResult;

/// What happened to one record during a sweep or a fast-path attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordOutcome {
    /// Executor succeeded; the record is gone and its follow-ups are queued.
    Completed {
        follow_ups: usize,
        new_messages: usize,
    },
    /// Executor failed; the record stays with its bumped counter.
    Failed { attempts: u32 },
    /// Needs the network and none is available. Nothing was touched.
    Deferred,
    /// Attempt ceiling exceeded; the record was abandoned.
    Evicted,
    /// A referenced entity no longer exists; the record was dropped.
    DroppedMissingEntity,
    /// Task type unknown to this build; the record is left in place.
    Unrecognized,
    /// The queue or entity store failed mid-way; the record is retried later.
    StoreFailure,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepReport {
    /// Record ids in the order they were visited.
    pub visited: Vec<QueueRecordId>,
    pub completed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub evicted: usize,
    pub dropped_missing_entity: usize,
    pub store_failures: usize,
    pub unrecognized: Vec<QueueRecordId>,
    pub new_messages: usize,
}

impl SweepReport {
    fn record(&mut self, id: QueueRecordId, outcome: &RecordOutcome) {
        self.visited.push(id);
        match outcome {
            RecordOutcome::Completed { new_messages, .. } => {
                self.completed += 1;
                self.new_messages += new_messages;
            }
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::Deferred => self.deferred += 1,
            RecordOutcome::Evicted => self.evicted += 1,
            RecordOutcome::DroppedMissingEntity => self.dropped_missing_entity += 1,
            RecordOutcome::Unrecognized => self.unrecognized.push(id),
            RecordOutcome::StoreFailure => self.store_failures += 1,
        }
    }
}

/// Entities resolved for one record, shaped by its task type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TaskInput {
    SendMessage(Message),
    ProcessOutgoingMessage(Message, Pubkey),
    DisseminateMessage(Payload, Pubkey),
    DisseminatePubkey(Payload),
    CreateIdentity(Address),
    ProcessIncomingMessages,
    SendAcks,
    ReDisseminatePubkeys,
}

#[derive(Clone)]
pub struct TaskQueueDispatcher {
    context: EngineContext,
}

impl TaskQueueDispatcher {
    pub fn new(context: EngineContext) -> Self {
        Self { context }
    }

    /// One full pass over the queue, oldest attempt first. Never fails: every
    /// problem is logged and left for a later sweep.
    pub fn run_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut records = match self.context.queue.list() {
            Ok(records) => records,
            Err(error) => {
                tracing::error!(
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to load queue records; skipping sweep"
                );
                return report;
            }
        };
        records.sort_by(QueueRecord::sweep_order);
        tracing::info!(pending = records.len(), "starting queue sweep");

        for record in &records {
            let outcome = self.process_record(record);
            report.record(record.id, &outcome);
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            deferred = report.deferred,
            evicted = report.evicted,
            dropped = report.dropped_missing_entity,
            "queue sweep finished"
        );
        report
    }

    /// Eviction check, connectivity gate, entity fetch, execution and
    /// bookkeeping for a single record.
    pub fn process_record(&self, record: &QueueRecord) -> RecordOutcome {
        if record.attempts > self.context.config.max_attempts {
            return self.evict(record);
        }

        let Some(task_type) = record.task_type() else {
            tracing::error!(
                record_id = record.id.0,
                task = record.task.as_str(),
                "queue record has an unrecognized task type; leaving it in place"
            );
            return RecordOutcome::Unrecognized;
        };

        if task_type.requires_network() && !self.context.connectivity.is_available() {
            tracing::debug!(
                record_id = record.id.0,
                task_type = ?task_type,
                "no connectivity; deferring queue record"
            );
            return RecordOutcome::Deferred;
        }

        let input = match self.load_input(task_type, record.primary_ref, record.secondary_ref) {
            Ok(Some(input)) => input,
            Ok(None) => {
                tracing::info!(
                    record_id = record.id.0,
                    task_type = ?task_type,
                    "referenced entity no longer exists; dropping queue record"
                );
                return match self.context.queue.delete(record) {
                    Ok(()) => RecordOutcome::DroppedMissingEntity,
                    Err(error) => self.store_failure(record, task_type, "drop", &error),
                };
            }
            Err(error) => return self.store_failure(record, task_type, "load entities", &error),
        };

        if let TaskInput::SendMessage(message) = &input {
            self.set_message_status(message.id, MessageStatus::Sending);
        }

        match self.execute(record, &input) {
            Ok(completion) => self.complete(record, task_type, &input, completion),
            Err(error) => self.record_failure(record, task_type, &error),
        }
    }

    pub(crate) fn load_input(
        &self,
        task_type: TaskType,
        primary_ref: Option<u64>,
        secondary_ref: Option<u64>,
    ) -> PersistenceResult<Option<TaskInput>> {
        let entities = &self.context.entities;
        let input = match task_type {
            TaskType::SendMessage => {
                fetch(primary_ref, |id| entities.message(MessageId(id)))?.map(TaskInput::SendMessage)
            }
            TaskType::ProcessOutgoingMessage => {
                let Some(message) = fetch(primary_ref, |id| entities.message(MessageId(id)))? else {
                    return Ok(None);
                };
                fetch(secondary_ref, |id| entities.pubkey(PubkeyId(id)))?
                    .map(|pubkey| TaskInput::ProcessOutgoingMessage(message, pubkey))
            }
            TaskType::DisseminateMessage => {
                let Some(payload) = fetch(primary_ref, |id| entities.payload(PayloadId(id)))? else {
                    return Ok(None);
                };
                fetch(secondary_ref, |id| entities.pubkey(PubkeyId(id)))?
                    .map(|pubkey| TaskInput::DisseminateMessage(payload, pubkey))
            }
            TaskType::DisseminatePubkey => fetch(primary_ref, |id| entities.payload(PayloadId(id)))?
                .map(TaskInput::DisseminatePubkey),
            TaskType::CreateIdentity => fetch(primary_ref, |id| entities.address(AddressId(id)))?
                .map(TaskInput::CreateIdentity),
            TaskType::ProcessIncomingMsgsAndSendAcks => Some(TaskInput::ProcessIncomingMessages),
            TaskType::SendAcks => Some(TaskInput::SendAcks),
            TaskType::ReDisseminatePubkeys => Some(TaskInput::ReDisseminatePubkeys),
        };
        Ok(input)
    }

    fn execute(&self, record: &QueueRecord, input: &TaskInput) -> ExecutionResult<TaskCompletion> {
        let executor = &self.context.executor;
        let do_pow = self.context.config.do_pow;
        match input {
            TaskInput::SendMessage(message) => executor.send_message(record, message, do_pow),
            TaskInput::ProcessOutgoingMessage(message, pubkey) => {
                executor.process_outgoing_message(record, message, pubkey, do_pow)
            }
            TaskInput::DisseminateMessage(payload, pubkey) => {
                executor.disseminate_message(record, payload, pubkey, do_pow)
            }
            TaskInput::DisseminatePubkey(payload) => {
                executor.disseminate_pubkey(record, payload, do_pow)
            }
            TaskInput::CreateIdentity(address) => {
                tracing::debug!(
                    record_id = record.id.0,
                    address = %address.address,
                    "generating keys for local identity"
                );
                executor.create_identity(record, do_pow)
            }
            TaskInput::ProcessIncomingMessages => executor.process_incoming_messages(),
            TaskInput::SendAcks => executor.send_acknowledgments(record),
            TaskInput::ReDisseminatePubkeys => executor.re_disseminate_pubkeys(record, do_pow),
        }
    }

    fn complete(
        &self,
        record: &QueueRecord,
        task_type: TaskType,
        input: &TaskInput,
        completion: TaskCompletion,
    ) -> RecordOutcome {
        let inserted = match self.context.queue.complete(record, &completion.follow_ups) {
            Ok(inserted) => inserted,
            Err(error) => return self.record_failure(record, task_type, &error),
        };
        for follow_up in &inserted {
            tracing::debug!(
                record_id = follow_up.id.0,
                task = follow_up.task.as_str(),
                "queued follow-up task"
            );
        }

        if let TaskInput::SendMessage(message) = input {
            self.set_message_status(message.id, MessageStatus::Sent);
        }

        if completion.new_messages > 0 {
            self.context
                .notifier
                .notify_new_messages(completion.new_messages);
        }

        tracing::info!(
            record_id = record.id.0,
            task_type = ?task_type,
            follow_ups = completion.follow_ups.len(),
            "queue record completed"
        );
        RecordOutcome::Completed {
            follow_ups: completion.follow_ups.len(),
            new_messages: completion.new_messages,
        }
    }

    pub(crate) fn enqueue_follow_ups(&self, follow_ups: &[NewQueueRecord]) -> PersistenceResult<()> {
        for follow_up in follow_ups {
            let inserted = self.context.queue.insert(follow_up)?;
            tracing::debug!(
                record_id = inserted.id.0,
                task_type = ?follow_up.task_type,
                "queued follow-up task"
            );
        }
        Ok(())
    }

    fn record_failure(
        &self,
        record: &QueueRecord,
        task_type: TaskType,
        error: &CoreError,
    ) -> RecordOutcome {
        let mut updated = record.clone();
        updated.attempts = record.attempts.saturating_add(1);
        updated.last_attempt_at = Some(self.context.clock.now());

        tracing::warn!(
            record_id = record.id.0,
            task_type = ?task_type,
            attempts = updated.attempts,
            kind = ?error.kind,
            message = %error.message,
            "queue task attempt failed"
        );

        match self.context.queue.update(&updated) {
            Ok(()) => RecordOutcome::Failed {
                attempts: updated.attempts,
            },
            // Another path already finished or dropped this record.
            Err(update_error) if update_error.kind == CoreErrorKind::NotFound => {
                RecordOutcome::Failed {
                    attempts: updated.attempts,
                }
            }
            Err(update_error) => {
                self.store_failure(record, task_type, "record failed attempt", &update_error)
            }
        }
    }

    fn evict(&self, record: &QueueRecord) -> RecordOutcome {
        tracing::warn!(
            record_id = record.id.0,
            task = record.task.as_str(),
            attempts = record.attempts,
            max_attempts = self.context.config.max_attempts,
            "queue record exceeded maximum attempts; abandoning it"
        );

        if record.task_type() == Some(TaskType::SendMessage)
            && let Some(message_id) = record.primary_ref
        {
            self.set_message_status(MessageId(message_id), MessageStatus::SendingFailed);
        }

        match self.context.queue.delete(record) {
            Ok(()) => RecordOutcome::Evicted,
            Err(error) => {
                tracing::error!(
                    record_id = record.id.0,
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to delete evicted queue record"
                );
                RecordOutcome::StoreFailure
            }
        }
    }

    fn set_message_status(&self, id: MessageId, status: MessageStatus) {
        let entities = &self.context.entities;
        let result = entities.message(id).and_then(|message| match message {
            Some(mut message) if message.status.can_become(status) => {
                message.status = status;
                entities.update_message(&message)
            }
            Some(message) => {
                if message.status != status {
                    tracing::debug!(
                        message_id = id.0,
                        current = ?message.status,
                        requested = ?status,
                        "message status left unchanged"
                    );
                }
                Ok(())
            }
            None => Ok(()),
        });

        if let Err(error) = result {
            tracing::error!(
                message_id = id.0,
                status = ?status,
                kind = ?error.kind,
                message = %error.message,
                "failed to update message status"
            );
        }
    }

    fn store_failure(
        &self,
        record: &QueueRecord,
        task_type: TaskType,
        step: &str,
        error: &CoreError,
    ) -> RecordOutcome {
        tracing::error!(
            record_id = record.id.0,
            task_type = ?task_type,
            step,
            kind = ?error.kind,
            message = %error.message,
            "queue store failure while processing record"
        );
        RecordOutcome::StoreFailure
    }
}

fn fetch<T>(
    id: Option<u64>,
    lookup: impl FnOnce(u64) -> PersistenceResult<Option<T>>,
) -> PersistenceResult<Option<T>> {
    match id {
        Some(id) => lookup(id),
        None => Ok(None),
    }
}
