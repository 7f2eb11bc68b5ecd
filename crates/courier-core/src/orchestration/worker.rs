use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::{
    EngineContext, EngineCycle, OrchestrationResult, TokioWakeFacility, WorkEngine, WorkRequest,
};

enum Job {
    Work(WorkRequest, Option<oneshot::Sender<EngineCycle>>),
    Shutdown,
}

/// Single consumer that runs engine cycles one at a time on the blocking
/// pool. Timer wakes and host requests share the same channel, so sweeps and
/// fast-path attempts never overlap.
#[derive(Clone)]
pub struct BackgroundWorker {
    jobs: mpsc::UnboundedSender<Job>,
    wake: Arc<TokioWakeFacility>,
}

impl BackgroundWorker {
    /// Must be called from within a tokio runtime.
    pub fn start(context: EngineContext) -> (Self, JoinHandle<()>) {
        let (jobs, receiver) = mpsc::unbounded_channel();

        let wake_jobs = jobs.clone();
        let wake = Arc::new(TokioWakeFacility::new(Handle::current(), move || {
            if wake_jobs
                .send(Job::Work(WorkRequest::Periodic, None))
                .is_err()
            {
                tracing::debug!("background worker stopped; dropping timer wake");
            }
        }));

        let engine = WorkEngine::new(context, wake.clone());
        let handle = tokio::spawn(run_jobs(engine, receiver, wake.clone()));
        (Self { jobs, wake }, handle)
    }

    /// Queues a request without waiting for its cycle.
    pub fn submit(&self, request: WorkRequest) -> OrchestrationResult<()> {
        self.jobs
            .send(Job::Work(request, None))
            .map_err(|_| worker_stopped())
    }

    /// Queues a request and waits for the cycle that handled it.
    pub async fn run(&self, request: WorkRequest) -> OrchestrationResult<EngineCycle> {
        let (reply, cycle) = oneshot::channel();
        self.jobs
            .send(Job::Work(request, Some(reply)))
            .map_err(|_| worker_stopped())?;
        cycle.await.map_err(|_| worker_stopped())
    }

    pub fn has_pending_wake(&self) -> bool {
        self.wake.has_pending()
    }

    /// Jobs already queued still run; the pending wake is dropped.
    pub fn shutdown(&self) {
        if self.jobs.send(Job::Shutdown).is_err() {
            tracing::debug!("background worker already stopped");
        }
        self.wake.cancel();
    }
}

async fn run_jobs(
    engine: WorkEngine,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    wake: Arc<TokioWakeFacility>,
) {
    while let Some(job) = jobs.recv().await {
        let (request, reply) = match job {
            Job::Work(request, reply) => (request, reply),
            Job::Shutdown => break,
        };

        let cycle_engine = engine.clone();
        match tokio::task::spawn_blocking(move || cycle_engine.handle(request)).await {
            Ok(cycle) => {
                if let Some(reply) = reply {
                    let _ = reply.send(cycle);
                }
            }
            Err(error) => tracing::error!(
                request = ?request,
                error = %error,
                "engine cycle did not complete"
            ),
        }
    }

    wake.cancel();
    tracing::info!("background worker stopped");
}

fn worker_stopped() -> CoreError {
    CoreError::new(CoreErrorKind::Internal, "background worker is not running")
}
