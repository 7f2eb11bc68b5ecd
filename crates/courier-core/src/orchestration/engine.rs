use std::sync::Arc;
use std::time::Duration;

use crate::models::{AddressId, CoreError, MessageId};
use crate::orchestration::{
    AdaptiveScheduler, EngineContext, FastPathTrigger, MaintenanceReport, MaintenanceScheduler,
    Submission, SweepReport, TaskQueueDispatcher, WakeFacility,
};

/// Work the host hands to the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkRequest {
    /// Timer wake or explicit "run everything now".
    Periodic,
    SendMessage(MessageId),
    CreateIdentity(AddressId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CycleWork {
    Sweep {
        sweep: SweepReport,
        maintenance: MaintenanceReport,
    },
    Submitted(Submission),
    Rejected(CoreError),
}

/// Outcome of one engine invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineCycle {
    pub work: CycleWork,
    pub next_wake: Duration,
}

/// Ties the dispatcher, maintenance pass, fast path and scheduler together.
/// Every invocation, whatever it did, ends by registering the next wake.
#[derive(Clone)]
pub struct WorkEngine {
    dispatcher: TaskQueueDispatcher,
    maintenance: MaintenanceScheduler,
    fast_path: FastPathTrigger,
    scheduler: AdaptiveScheduler,
}

impl WorkEngine {
    pub fn new(context: EngineContext, wake: Arc<dyn WakeFacility>) -> Self {
        Self {
            dispatcher: TaskQueueDispatcher::new(context.clone()),
            maintenance: MaintenanceScheduler::new(context.clone()),
            fast_path: FastPathTrigger::new(context.clone()),
            scheduler: AdaptiveScheduler::new(context, wake),
        }
    }

    pub fn handle(&self, request: WorkRequest) -> EngineCycle {
        let work = match request {
            WorkRequest::Periodic => self.periodic(),
            WorkRequest::SendMessage(message) => {
                Self::submitted(self.fast_path.submit_send_message(message))
            }
            WorkRequest::CreateIdentity(address) => {
                Self::submitted(self.fast_path.submit_create_identity(address))
            }
        };

        let next_wake = self.scheduler.schedule_next_sweep();
        EngineCycle { work, next_wake }
    }

    fn periodic(&self) -> CycleWork {
        let sweep = self.dispatcher.run_sweep();
        let maintenance = self.maintenance.run();
        CycleWork::Sweep { sweep, maintenance }
    }

    fn submitted(result: Result<Submission, CoreError>) -> CycleWork {
        match result {
            Ok(submission) => CycleWork::Submitted(submission),
            Err(error) => {
                tracing::warn!(
                    task_type = ?error.task,
                    kind = ?error.kind,
                    message = %error.message,
                    "user request rejected"
                );
                CycleWork::Rejected(error)
            }
        }
    }
}
