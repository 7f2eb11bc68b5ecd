use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::clock::elapsed_secs;
use crate::orchestration::EngineContext;

/// One-shot host timer. Scheduling a wake replaces whatever wake this
/// component had pending, so timers never pile up.
pub trait WakeFacility: Send + Sync {
    fn schedule_wake(&self, after: Duration);
}

/// Picks the delay before the next sweep and registers it.
#[derive(Clone)]
pub struct AdaptiveScheduler {
    context: EngineContext,
    wake: Arc<dyn WakeFacility>,
}

impl AdaptiveScheduler {
    pub fn new(context: EngineContext, wake: Arc<dyn WakeFacility>) -> Self {
        Self { context, wake }
    }

    /// Short interval while message checks are overdue and the network is
    /// back; normal interval otherwise.
    pub fn next_delay(&self) -> Duration {
        let config = &self.context.config;
        let last_check = match self.context.scheduling.last_message_check_time() {
            Ok(last_check) => last_check,
            Err(error) => {
                tracing::error!(
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to read last message check time"
                );
                return config.normal_interval();
            }
        };

        let since_check = elapsed_secs(self.context.clock.now(), last_check);
        if since_check > config.normal_interval_secs && self.context.connectivity.is_available() {
            config.short_interval()
        } else {
            config.normal_interval()
        }
    }

    pub fn schedule_next_sweep(&self) -> Duration {
        let delay = self.next_delay();
        tracing::info!(delay_secs = delay.as_secs(), "next queue sweep scheduled");
        self.wake.schedule_wake(delay);
        delay
    }
}

/// Wake facility backed by a tokio timer task. Each call aborts the timer
/// still pending from the previous call.
pub struct TokioWakeFacility {
    runtime: Handle,
    on_wake: Arc<dyn Fn() + Send + Sync>,
    pending: Mutex<Option<AbortHandle>>,
}

impl TokioWakeFacility {
    pub fn new(runtime: Handle, on_wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            runtime,
            on_wake: Arc::new(on_wake),
            pending: Mutex::new(None),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock()
            && let Some(handle) = pending.take()
        {
            handle.abort();
        }
    }
}

impl WakeFacility for TokioWakeFacility {
    fn schedule_wake(&self, after: Duration) {
        let Ok(mut pending) = self.pending.lock() else {
            tracing::error!("wake facility mutex poisoned; next sweep not scheduled");
            return;
        };
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let on_wake = self.on_wake.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            on_wake();
        });
        *pending = Some(timer.abort_handle());
    }
}
