//! Drives the sync coordinator on a schedule: a periodic timer, a debounced
//! trigger for local mutations, and a watch channel for reconnect events.
//! Teacher analogue: the jittered `tokio::spawn` loop in
//! `device_sync::engine::ensure_background_engine_started`, split here into
//! three explicit event sources instead of one delay computed ad hoc each
//! iteration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use sync_core::constants::DEBOUNCE_MUTATION_SECS;

use crate::coordinator::{SyncCoordinator, SyncTrigger};

/// Cheap, cloneable handle other tasks use to wake the scheduler: a local
/// write debounces into the next cycle, a reconnect fires one immediately.
#[derive(Clone)]
pub struct SchedulerHandle {
    mutation_tx: mpsc::UnboundedSender<()>,
    reconnect_tx: watch::Sender<u64>,
}

impl SchedulerHandle {
    pub fn notify_mutation(&self) {
        let _ = self.mutation_tx.send(());
    }

    pub fn notify_reconnect(&self) {
        self.reconnect_tx.send_modify(|counter| *counter = counter.wrapping_add(1));
    }
}

pub struct Scheduler {
    coordinator: Arc<SyncCoordinator>,
    periodic_interval: Duration,
    mutation_rx: mpsc::UnboundedReceiver<()>,
    reconnect_rx: watch::Receiver<u64>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<SyncCoordinator>, periodic_interval: Duration) -> (Self, SchedulerHandle) {
        let (mutation_tx, mutation_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = watch::channel(0);
        (
            Self { coordinator, periodic_interval, mutation_rx, reconnect_rx },
            SchedulerHandle { mutation_tx, reconnect_tx },
        )
    }

    /// Runs until the owning task is dropped. Never returns on its own: a
    /// closed mutation channel or reconnect channel just disables that
    /// event source rather than ending the loop, since the periodic timer
    /// must keep running regardless of which handles are still alive.
    pub async fn run_forever(mut self) {
        let mut periodic = tokio::time::interval(self.periodic_interval);
        periodic.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; the caller already runs a Startup
        // cycle before handing control to the scheduler.
        periodic.tick().await;

        let mut pending_mutation_deadline: Option<Instant> = None;

        loop {
            let debounce_sleep = match pending_mutation_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(Duration::from_secs(u64::MAX / 2)),
            };
            tokio::pin!(debounce_sleep);

            tokio::select! {
                _ = periodic.tick() => {
                    self.run_trigger(SyncTrigger::Periodic).await;
                }
                _ = &mut debounce_sleep, if pending_mutation_deadline.is_some() => {
                    pending_mutation_deadline = None;
                    self.run_trigger(SyncTrigger::DebouncedMutation).await;
                }
                maybe_mutation = self.mutation_rx.recv() => {
                    if maybe_mutation.is_some() {
                        pending_mutation_deadline =
                            Some(Instant::now() + Duration::from_secs(DEBOUNCE_MUTATION_SECS));
                    }
                }
                changed = self.reconnect_rx.changed() => {
                    if changed.is_ok() {
                        self.run_trigger(SyncTrigger::Reconnect).await;
                    }
                }
            }
        }
    }

    async fn run_trigger(&self, trigger: SyncTrigger) {
        if let Err(err) = self.coordinator.run_cycle(trigger).await {
            tracing::warn!(?trigger, error = %err, "scheduled sync cycle failed");
        }
    }
}
