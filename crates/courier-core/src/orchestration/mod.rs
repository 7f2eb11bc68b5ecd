pub mod dispatcher;
pub mod engine;
pub mod fast_path;
pub mod maintenance;
pub mod scheduler;
pub mod worker;

pub use dispatcher::{RecordOutcome, SweepReport, TaskQueueDispatcher};
pub use engine::{CycleWork, EngineCycle, WorkEngine, WorkRequest};
pub use fast_path::{FastPathTrigger, Submission};
pub use maintenance::{MaintenanceReport, MaintenanceScheduler};
pub use scheduler::{AdaptiveScheduler, TokioWakeFacility, WakeFacility};
pub use worker::BackgroundWorker;

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::connectivity::ConnectivityProbe;
use crate::executor::{
    DatabaseCleaner, NoopDatabaseCleaner, NoopNotificationBridge, NotificationBridge,
    ProtocolExecutor,
};
use crate::models::CoreError;
use crate::persistence::{EntityStore, QueueStore, SchedulingStateStore};

pub type OrchestrationResult<T> = Result<T, CoreError>;

/// Collaborators shared by the dispatcher, the maintenance pass and the
/// scheduler. Owned by the hosting process and cloned into each component.
#[derive(Clone)]
pub struct EngineContext {
    pub queue: Arc<dyn QueueStore>,
    pub scheduling: Arc<dyn SchedulingStateStore>,
    pub entities: Arc<dyn EntityStore>,
    pub executor: Arc<dyn ProtocolExecutor>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub notifier: Arc<dyn NotificationBridge>,
    pub cleaner: Arc<dyn DatabaseCleaner>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        scheduling: Arc<dyn SchedulingStateStore>,
        entities: Arc<dyn EntityStore>,
        executor: Arc<dyn ProtocolExecutor>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            queue,
            scheduling,
            entities,
            executor,
            connectivity,
            notifier: Arc::new(NoopNotificationBridge),
            cleaner: Arc::new(NoopDatabaseCleaner),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationBridge>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn DatabaseCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}
