use crate::models::{
    AddressId, CoreError, CoreErrorKind, MessageId, NewQueueRecord, QueueRecordId, TaskType,
};
use crate::orchestration::{EngineContext, OrchestrationResult, RecordOutcome, TaskQueueDispatcher};

/// Result of a user-originated request: the durable record plus what the
/// immediate attempt did with it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submission {
    pub record: QueueRecordId,
    pub immediate: RecordOutcome,
}

/// Entry point for user requests. The record is persisted first; the
/// immediate attempt is a latency optimization on top of the regular sweep.
#[derive(Clone)]
pub struct FastPathTrigger {
    context: EngineContext,
    dispatcher: TaskQueueDispatcher,
}

impl FastPathTrigger {
    pub fn new(context: EngineContext) -> Self {
        let dispatcher = TaskQueueDispatcher::new(context.clone());
        Self {
            context,
            dispatcher,
        }
    }

    pub fn submit_send_message(&self, message: MessageId) -> OrchestrationResult<Submission> {
        self.submit(TaskType::SendMessage, Some(message.0), None)
    }

    pub fn submit_create_identity(&self, address: AddressId) -> OrchestrationResult<Submission> {
        self.submit(TaskType::CreateIdentity, Some(address.0), None)
    }

    /// Fails with `InvalidInput` when the references do not match what the
    /// task type needs, and with `NotFound` (queueing nothing) when a
    /// referenced entity is already gone.
    pub fn submit(
        &self,
        task_type: TaskType,
        primary_ref: Option<u64>,
        secondary_ref: Option<u64>,
    ) -> OrchestrationResult<Submission> {
        let needed = task_type.entity_refs();
        if (primary_ref.is_some(), secondary_ref.is_some()) != (needed >= 1, needed >= 2) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "{} requests take {needed} entity reference(s)",
                    task_type.as_str()
                ),
            )
            .with_task(task_type));
        }

        let resolved = self
            .dispatcher
            .load_input(task_type, primary_ref, secondary_ref)
            .map_err(|error| error.with_task(task_type))?;
        if resolved.is_none() {
            tracing::info!(
                task_type = ?task_type,
                primary_ref,
                secondary_ref,
                "requested entity no longer exists; request aborted"
            );
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!(
                    "entity referenced by {} request does not exist",
                    task_type.as_str()
                ),
            )
            .with_task(task_type));
        }

        let new_record = NewQueueRecord {
            primary_ref,
            secondary_ref,
            ..NewQueueRecord::new(task_type, self.context.clock.now())
        };
        let record = self
            .context
            .queue
            .insert(&new_record)
            .map_err(|error| error.with_task(task_type))?;
        tracing::info!(
            record_id = record.id.0,
            task_type = ?task_type,
            "queued user request"
        );

        let immediate = self.dispatcher.process_record(&record);
        Ok(Submission {
            record: record.id,
            immediate,
        })
    }
}
