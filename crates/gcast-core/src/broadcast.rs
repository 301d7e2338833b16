//! Periodic fan-out of every stored message to every registered group.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Group, StoredMessage},
    interval::Interval,
    messaging::{port::MessagingPort, types::BroadcastPost},
    utils::ErrorLog,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Started,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Messages and groups captured when broadcasting is turned on.
#[derive(Clone, Debug, Default)]
pub struct BroadcastSnapshot {
    pub messages: Vec<StoredMessage>,
    pub groups: Vec<Group>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

struct BroadcasterInner {
    messenger: Arc<dyn MessagingPort>,
    interval: Arc<Interval>,
    error_log: Arc<ErrorLog>,
    active: Mutex<Option<ActiveRun>>,
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Broadcaster {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        interval: Arc<Interval>,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                messenger,
                interval,
                error_log,
                active: Mutex::new(None),
            }),
        }
    }

    pub async fn run_state(&self) -> RunState {
        match &*self.inner.active.lock().await {
            Some(run) if !run.handle.is_finished() => RunState::Started,
            _ => RunState::Stopped,
        }
    }

    /// Spawn the broadcast loop over `snapshot`. Does nothing if a loop is already live.
    pub async fn start(&self, snapshot: BroadcastSnapshot) -> StartOutcome {
        let mut active = self.inner.active.lock().await;
        if let Some(run) = &*active {
            if !run.handle.is_finished() {
                return StartOutcome::AlreadyRunning;
            }
        }
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let broadcaster = self.clone();
        tracing::info!(
            messages = snapshot.messages.len(),
            groups = snapshot.groups.len(),
            interval_secs = self.inner.interval.get(),
            "broadcast started"
        );
        let handle = tokio::spawn(async move {
            broadcaster.run_loop(snapshot, cancel_clone).await;
        });

        *active = Some(ActiveRun { cancel, handle });
        StartOutcome::Started
    }

    /// Signal the loop to stop. A sweep already in flight completes; no new sweep starts.
    ///
    /// Returns the task handle so callers may wait for it to wind down.
    pub async fn stop(&self) -> Option<JoinHandle<()>> {
        let run = self.inner.active.lock().await.take()?;
        run.cancel.cancel();
        tracing::info!("broadcast stop requested");
        Some(run.handle)
    }

    async fn run_loop(&self, snapshot: BroadcastSnapshot, cancel: CancellationToken) {
        let mut cycle: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            cycle += 1;
            let report = self.sweep(&snapshot).await;
            tracing::info!(
                cycle,
                sent = report.sent,
                failed = report.failed,
                "broadcast sweep finished"
            );

            let secs = self.inner.interval.get();
            if secs == 0 {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tokio::task::yield_now() => {}
                }
                continue;
            }

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(Duration::from_secs(secs)) => {}
            }
        }
        tracing::info!(cycles = cycle, "broadcast loop exited");
    }

    /// One pass: every message to every group, in snapshot order.
    ///
    /// A failed delivery is logged and the pass continues.
    pub async fn sweep(&self, snapshot: &BroadcastSnapshot) -> SweepReport {
        let mut report = SweepReport::default();
        for message in &snapshot.messages {
            let post = BroadcastPost::from_message(message);
            for group in &snapshot.groups {
                match self.inner.messenger.send_post(group.chat_id, &post).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            msg_id = message.msg_id,
                            chat_id = group.chat_id.0,
                            group = %group.username,
                            "broadcast delivery failed: {e}"
                        );
                        self.inner.error_log.record(
                            &format!(
                                "broadcast message {} to {} ({})",
                                message.msg_id, group.username, group.chat_id.0
                            ),
                            &format!("{e:?}"),
                        );
                    }
                }
            }
        }
        report
    }
}
