#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use courier_core::clock::ManualClock;
use courier_core::connectivity::StaticConnectivity;
use courier_core::executor::{
    DatabaseCleaner, ExecutionResult, NotificationBridge, ProtocolExecutor, TaskCompletion,
};
use courier_core::models::{
    Address, AddressId, CoreError, CoreErrorKind, Message, MessageId, MessageStatus,
    NewQueueRecord, Payload, Pubkey, QueueRecord, QueueRecordId, TaskType,
};
use courier_core::orchestration::{EngineContext, WakeFacility};
use courier_core::persistence::{
    EntityStore, InMemoryEntityStore, InMemoryQueueStore, InMemorySchedulingState, QueueStore,
};

pub const START_SECS: u64 = 1_700_000_000;

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

pub fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("courier-{test_name}-{nanos}.sqlite3"))
}

/// Executor whose per-task results are set by the test. Every call is
/// recorded in order.
#[derive(Default)]
pub struct ScriptedExecutor {
    failing: Mutex<HashSet<TaskType>>,
    follow_ups: Mutex<HashMap<TaskType, Vec<NewQueueRecord>>>,
    new_messages: Mutex<HashMap<TaskType, usize>>,
    calls: Mutex<Vec<(TaskType, Option<QueueRecordId>)>>,
    incoming: AtomicUsize,
    message_checks: AtomicUsize,
    pubkey_checks: AtomicUsize,
    pubkeys_due: Mutex<Vec<NewQueueRecord>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, task: TaskType) {
        self.failing.lock().unwrap().insert(task);
    }

    pub fn succeed(&self, task: TaskType) {
        self.failing.lock().unwrap().remove(&task);
    }

    pub fn follow_up_after(&self, task: TaskType, follow_up: NewQueueRecord) {
        self.follow_ups
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push(follow_up);
    }

    pub fn report_new_messages(&self, task: TaskType, count: usize) {
        self.new_messages.lock().unwrap().insert(task, count);
    }

    pub fn set_incoming(&self, count: usize) {
        self.incoming.store(count, Ordering::SeqCst);
    }

    pub fn set_pubkeys_due(&self, follow_ups: Vec<NewQueueRecord>) {
        *self.pubkeys_due.lock().unwrap() = follow_ups;
    }

    pub fn calls(&self) -> Vec<(TaskType, Option<QueueRecordId>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, task: TaskType) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| *called == task)
            .count()
    }

    pub fn message_checks(&self) -> usize {
        self.message_checks.load(Ordering::SeqCst)
    }

    pub fn pubkey_checks(&self) -> usize {
        self.pubkey_checks.load(Ordering::SeqCst)
    }

    fn run(
        &self,
        task: TaskType,
        record: Option<&QueueRecord>,
    ) -> ExecutionResult<TaskCompletion> {
        self.calls
            .lock()
            .unwrap()
            .push((task, record.map(|record| record.id)));

        if self.failing.lock().unwrap().contains(&task) {
            return Err(CoreError::new(
                CoreErrorKind::ExecutionFailure,
                format!("scripted failure for {}", task.as_str()),
            )
            .with_task(task));
        }

        let mut completion = TaskCompletion::done();
        if let Some(follow_ups) = self.follow_ups.lock().unwrap().get(&task) {
            for follow_up in follow_ups {
                completion = completion.with_follow_up(follow_up.clone());
            }
        }
        if let Some(count) = self.new_messages.lock().unwrap().get(&task) {
            completion = completion.with_new_messages(*count);
        }
        Ok(completion)
    }
}

impl ProtocolExecutor for ScriptedExecutor {
    fn send_message(
        &self,
        record: &QueueRecord,
        _message: &Message,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::SendMessage, Some(record))
    }

    fn process_outgoing_message(
        &self,
        record: &QueueRecord,
        _message: &Message,
        _pubkey: &Pubkey,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::ProcessOutgoingMessage, Some(record))
    }

    fn disseminate_message(
        &self,
        record: &QueueRecord,
        _payload: &Payload,
        _pubkey: &Pubkey,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::DisseminateMessage, Some(record))
    }

    fn disseminate_pubkey(
        &self,
        record: &QueueRecord,
        _payload: &Payload,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::DisseminatePubkey, Some(record))
    }

    fn process_incoming_messages(&self) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::ProcessIncomingMsgsAndSendAcks, None)
    }

    fn send_acknowledgments(&self, record: &QueueRecord) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::SendAcks, Some(record))
    }

    fn create_identity(
        &self,
        record: &QueueRecord,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::CreateIdentity, Some(record))
    }

    fn re_disseminate_pubkeys(
        &self,
        record: &QueueRecord,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.run(TaskType::ReDisseminatePubkeys, Some(record))
    }

    fn check_if_pubkey_dissemination_is_due(
        &self,
        _do_pow: bool,
    ) -> ExecutionResult<TaskCompletion> {
        self.pubkey_checks.fetch_add(1, Ordering::SeqCst);
        let mut completion = TaskCompletion::done();
        for follow_up in self.pubkeys_due.lock().unwrap().drain(..) {
            completion = completion.with_follow_up(follow_up);
        }
        Ok(completion)
    }

    fn check_for_messages_and_send_acks(&self) -> ExecutionResult<usize> {
        self.message_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.incoming.swap(0, Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<usize>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<usize> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationBridge for RecordingNotifier {
    fn notify_new_messages(&self, count: usize) {
        self.notifications.lock().unwrap().push(count);
    }
}

#[derive(Default)]
pub struct CountingCleaner {
    runs: AtomicUsize,
}

impl CountingCleaner {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl DatabaseCleaner for CountingCleaner {
    fn clean_database(&self) -> ExecutionResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every wake registration instead of arming a timer.
#[derive(Default)]
pub struct RecordingWake {
    scheduled: Mutex<Vec<Duration>>,
}

impl RecordingWake {
    pub fn scheduled(&self) -> Vec<Duration> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl WakeFacility for RecordingWake {
    fn schedule_wake(&self, after: Duration) {
        self.scheduled.lock().unwrap().push(after);
    }
}

/// In-memory engine wiring with handles to every collaborator.
pub struct Harness {
    pub queue: Arc<InMemoryQueueStore>,
    pub scheduling: Arc<InMemorySchedulingState>,
    pub entities: Arc<InMemoryEntityStore>,
    pub executor: Arc<ScriptedExecutor>,
    pub connectivity: StaticConnectivity,
    pub notifier: Arc<RecordingNotifier>,
    pub cleaner: Arc<CountingCleaner>,
    pub clock: ManualClock,
    pub context: EngineContext,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        let queue = Arc::new(InMemoryQueueStore::new());
        let scheduling = Arc::new(InMemorySchedulingState::new());
        let entities = Arc::new(InMemoryEntityStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let connectivity = StaticConnectivity::new(online);
        let notifier = Arc::new(RecordingNotifier::default());
        let cleaner = Arc::new(CountingCleaner::default());
        let clock = ManualClock::new(at(START_SECS));

        let context = EngineContext::new(
            queue.clone(),
            scheduling.clone(),
            entities.clone(),
            executor.clone(),
            Arc::new(connectivity.clone()),
        )
        .with_notifier(notifier.clone())
        .with_cleaner(cleaner.clone())
        .with_clock(Arc::new(clock.clone()));

        Self {
            queue,
            scheduling,
            entities,
            executor,
            connectivity,
            notifier,
            cleaner,
            clock,
            context,
        }
    }

    pub fn add_message(&self, id: u64, status: MessageStatus) -> MessageId {
        let message_id = MessageId(id);
        self.entities
            .put_message(Message {
                id: message_id,
                to_address: "BM-recipient".to_string(),
                from_address: "BM-sender".to_string(),
                subject: format!("subject {id}"),
                body: "hello".to_string(),
                status,
            })
            .unwrap();
        message_id
    }

    pub fn add_address(&self, id: u64) -> AddressId {
        let address_id = AddressId(id);
        self.entities
            .put_address(Address {
                id: address_id,
                address: format!("BM-local-{id}"),
                label: None,
            })
            .unwrap();
        address_id
    }

    pub fn message_status(&self, id: MessageId) -> MessageStatus {
        self.entities.message(id).unwrap().unwrap().status
    }

    pub fn records(&self) -> Vec<QueueRecord> {
        self.queue.list().unwrap()
    }
}
