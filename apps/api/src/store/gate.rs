//! Capability gate — waits for the platform client to appear in its host.
//!
//! Checks once up front, then runs a polling loop and a deadline timer as two
//! separately abortable tasks. Whichever finishes first aborts the other and
//! clears both handles, so at most one of each is ever outstanding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::platform::PlatformHost;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// `start` has not been called.
    Idle,
    Waiting,
    Ready,
    TimedOut,
}

impl GateStatus {
    fn is_settled(self) -> bool {
        matches!(self, GateStatus::Ready | GateStatus::TimedOut)
    }
}

#[derive(Default)]
struct GateTimers {
    poll: Option<JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
}

impl GateTimers {
    fn is_running(&self) -> bool {
        self.poll.is_some() || self.deadline.is_some()
    }
}

pub struct CapabilityGate {
    host: Arc<dyn PlatformHost>,
    status: Arc<watch::Sender<GateStatus>>,
    timers: Arc<Mutex<GateTimers>>,
    poll_interval: Duration,
    deadline: Duration,
    /// Number of polling loops started over the gate's lifetime.
    launches: AtomicU64,
}

fn lock(timers: &Mutex<GateTimers>) -> MutexGuard<'_, GateTimers> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CapabilityGate {
    pub fn new(host: Arc<dyn PlatformHost>) -> Self {
        Self::with_timing(host, POLL_INTERVAL, DEADLINE)
    }

    pub fn with_timing(
        host: Arc<dyn PlatformHost>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        let (status, _) = watch::channel(GateStatus::Idle);
        Self {
            host,
            status: Arc::new(status),
            timers: Arc::new(Mutex::new(GateTimers::default())),
            poll_interval,
            deadline,
            launches: AtomicU64::new(0),
        }
    }

    #[allow(dead_code)]
    pub fn status(&self) -> GateStatus {
        *self.status.borrow()
    }

    /// Begins waiting for the platform client. Calling this while a wait is
    /// already in flight is a no-op.
    pub fn start(&self) {
        let mut timers = lock(&self.timers);
        if timers.is_running() {
            debug!("Capability gate already waiting");
            return;
        }

        if self.host.client().is_some() {
            self.status.send_replace(GateStatus::Ready);
            return;
        }

        self.status.send_replace(GateStatus::Waiting);
        let launch = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Waiting for platform client, attempt {launch} (poll every {}ms, deadline {}s)",
            self.poll_interval.as_millis(),
            self.deadline.as_secs()
        );

        timers.poll = Some(tokio::spawn(poll_loop(
            Arc::clone(&self.host),
            Arc::clone(&self.status),
            Arc::clone(&self.timers),
            self.poll_interval,
        )));
        timers.deadline = Some(tokio::spawn(deadline_timer(
            Arc::clone(&self.status),
            Arc::clone(&self.timers),
            self.deadline,
        )));
    }

    /// Resolves once the gate settles. Returns `Idle` if `start` was never called.
    pub async fn wait(&self) -> GateStatus {
        let mut rx = self.status.subscribe();
        if *rx.borrow() == GateStatus::Idle {
            return GateStatus::Idle;
        }
        let settled = match rx.wait_for(|status| status.is_settled()).await {
            Ok(status) => *status,
            // The sender lives as long as the gate.
            Err(_) => GateStatus::TimedOut,
        };
        settled
    }

    #[cfg(test)]
    fn outstanding_timers(&self) -> (bool, bool) {
        let timers = lock(&self.timers);
        (timers.poll.is_some(), timers.deadline.is_some())
    }
}

async fn poll_loop(
    host: Arc<dyn PlatformHost>,
    status: Arc<watch::Sender<GateStatus>>,
    timers: Arc<Mutex<GateTimers>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // the first tick completes immediately
    loop {
        ticker.tick().await;
        if host.client().is_none() {
            continue;
        }

        let mut timers = lock(&timers);
        if *status.borrow() == GateStatus::Waiting {
            status.send_replace(GateStatus::Ready);
            info!("Platform client observed");
        }
        if let Some(deadline) = timers.deadline.take() {
            deadline.abort();
        }
        timers.poll = None;
        return;
    }
}

async fn deadline_timer(
    status: Arc<watch::Sender<GateStatus>>,
    timers: Arc<Mutex<GateTimers>>,
    deadline: Duration,
) {
    tokio::time::sleep(deadline).await;

    let mut timers = lock(&timers);
    if *status.borrow() == GateStatus::Waiting {
        status.send_replace(GateStatus::TimedOut);
        warn!("Platform client not observed within {}s", deadline.as_secs());
    }
    if let Some(poll) = timers.poll.take() {
        poll.abort();
    }
    timers.deadline = None;
}
