use std::time::{SystemTime, UNIX_EPOCH};

use crate::clock::elapsed_secs;
use crate::orchestration::{EngineContext, TaskQueueDispatcher};

/// Which default recurring checks ran after a sweep.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MaintenanceReport {
    pub checked_messages: bool,
    pub checked_pubkeys: bool,
    pub cleaned_database: bool,
    pub new_messages: usize,
    pub follow_ups: usize,
}

/// Recurring work that is not modeled as queue records: polling for new
/// messages, pubkey re-dissemination checks, and database cleaning.
#[derive(Clone)]
pub struct MaintenanceScheduler {
    context: EngineContext,
    dispatcher: TaskQueueDispatcher,
}

impl MaintenanceScheduler {
    pub fn new(context: EngineContext) -> Self {
        let dispatcher = TaskQueueDispatcher::new(context.clone());
        Self {
            context,
            dispatcher,
        }
    }

    pub fn run(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        let now = self.context.clock.now();

        if self.has_local_identity() {
            if self.context.connectivity.is_available() {
                self.check_for_messages(now, &mut report);
                self.check_pubkey_dissemination(&mut report);
            } else {
                tracing::debug!("no connectivity; skipping message and pubkey checks");
            }
        } else {
            tracing::info!("no local identities exist; skipping message and pubkey checks");
        }

        if self.database_cleaning_due(now) {
            self.clean_database(now);
            report.cleaned_database = true;
        }

        report
    }

    fn has_local_identity(&self) -> bool {
        match self.context.entities.list_addresses() {
            Ok(addresses) => !addresses.is_empty(),
            Err(error) => {
                tracing::error!(
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to list local identities"
                );
                false
            }
        }
    }

    fn check_for_messages(&self, now: SystemTime, report: &mut MaintenanceReport) {
        report.checked_messages = true;
        let count = match self.context.executor.check_for_messages_and_send_acks() {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(
                    kind = ?error.kind,
                    message = %error.message,
                    "check for new messages failed"
                );
                return;
            }
        };

        if let Err(error) = self.context.scheduling.set_last_message_check_time(now) {
            tracing::error!(
                kind = ?error.kind,
                message = %error.message,
                "failed to persist last message check time"
            );
        }

        report.new_messages = count;
        if count > 0 {
            tracing::info!(count, "new messages received");
            self.context.notifier.notify_new_messages(count);
        }
    }

    fn check_pubkey_dissemination(&self, report: &mut MaintenanceReport) {
        report.checked_pubkeys = true;
        let completion = match self
            .context
            .executor
            .check_if_pubkey_dissemination_is_due(self.context.config.do_pow)
        {
            Ok(completion) => completion,
            Err(error) => {
                tracing::warn!(
                    kind = ?error.kind,
                    message = %error.message,
                    "pubkey re-dissemination check failed"
                );
                return;
            }
        };

        match self.dispatcher.enqueue_follow_ups(&completion.follow_ups) {
            Ok(()) => report.follow_ups = completion.follow_ups.len(),
            Err(error) => tracing::error!(
                kind = ?error.kind,
                message = %error.message,
                "failed to queue pubkey re-dissemination work"
            ),
        }
    }

    fn database_cleaning_due(&self, now: SystemTime) -> bool {
        let last_clean = match self.context.scheduling.last_database_clean_time() {
            Ok(last_clean) => last_clean,
            Err(error) => {
                tracing::error!(
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to read last database clean time"
                );
                return false;
            }
        };

        if last_clean == UNIX_EPOCH {
            return true;
        }

        let since_last = elapsed_secs(now, last_clean);
        let interval = self.context.config.database_clean_interval_secs;
        if since_last > interval {
            return true;
        }
        tracing::debug!(
            since_last,
            next_in = interval - since_last,
            "database cleaning not yet due"
        );
        false
    }

    fn clean_database(&self, now: SystemTime) {
        if let Err(error) = self.context.cleaner.clean_database() {
            tracing::warn!(
                kind = ?error.kind,
                message = %error.message,
                "database cleaning failed"
            );
        }
        if let Err(error) = self.context.scheduling.set_last_database_clean_time(now) {
            tracing::error!(
                kind = ?error.kind,
                message = %error.message,
                "failed to persist last database clean time"
            );
        }
    }
}
