//! Periodic fetch sessions
//!
//! A poll session refreshes one resource on a fixed cadence:
//!
//! - The first tick fires immediately, then every [`POLL_INTERVAL`].
//! - A tick that finds the previous fetch still in flight is skipped, not queued, so a
//!   resource never has two requests outstanding and its results apply in issue order.
//! - On settlement the result goes to the [`ResultSink`] (normally the
//!   [`Reconciler`]) together with the session's active flag. The sink checks the flag
//!   while committing, so late results of a stopped session are dropped even when the
//!   stop races with the fetch settling.
//! - Failures are retried on the next tick at the same cadence, without backoff.
//!
//! Stopping a session (explicitly or by dropping its [`PollHandle`]) cancels the timer
//! task. A fetch already in flight is left to finish and its result is discarded.

use crate::endpoints::{EndpointError, Payload};
use crate::reconciler::{Reconciler, ResourceId};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

/// Refresh cadence of every periodic resource.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Produces one fetch per call.
pub type FetchFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Payload, EndpointError>> + Send + Sync>;

/// Receives settled poll results.
pub trait ResultSink: Send + Sync {
    /// Apply the result of one fetch of `resource` if `live` is still set, returning
    /// whether it was applied.
    ///
    /// `live` must be read inside the same critical section that commits the result,
    /// so that a stop followed by a reset of the sink is never overwritten.
    fn deliver(
        &self,
        resource: ResourceId,
        result: Result<Payload, EndpointError>,
        live: &AtomicBool,
    ) -> bool;
}

impl ResultSink for Reconciler {
    fn deliver(
        &self,
        resource: ResourceId,
        result: Result<Payload, EndpointError>,
        live: &AtomicBool,
    ) -> bool {
        self.update_while(live, resource, result).unwrap_or_else(|e| {
            error!(resource = %resource, error = %e, "Dropping poll result");
            false
        })
    }
}

/// Bookkeeping of one resource's poll cycle.
#[derive(Debug)]
pub struct PollSession {
    resource_id: ResourceId,
    interval: Duration,
    in_flight: AtomicBool,
    active: AtomicBool,
    fetches: AtomicU64,
    skipped: AtomicU64,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl PollSession {
    fn new(resource_id: ResourceId, interval: Duration) -> Self {
        Self {
            resource_id,
            interval,
            in_flight: AtomicBool::new(false),
            active: AtomicBool::new(true),
            fetches: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            last_success_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Resource this session refreshes.
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a fetch is outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether results are still being delivered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Ticks skipped because a fetch was still in flight.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Time of the last successful fetch.
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        *self.last_success_at.lock()
    }

    /// Message of the last failed fetch, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record(&self, result: &Result<Payload, EndpointError>) {
        match result {
            Ok(_) => {
                *self.last_success_at.lock() = Some(Utc::now());
                *self.last_error.lock() = None;
            }
            Err(e) => *self.last_error.lock() = Some(e.to_string()),
        }
    }
}

/// Owner of a running session. Dropping it stops the session.
#[derive(Debug)]
pub struct PollHandle {
    session: Arc<PollSession>,
    ticker: JoinHandle<()>,
}

impl PollHandle {
    /// Session state.
    pub fn session(&self) -> &Arc<PollSession> {
        &self.session
    }

    /// Stop ticking and discard any result still in flight. Idempotent.
    pub fn stop(&self) {
        if self.session.active.swap(false, Ordering::AcqRel) {
            info!(resource = %self.session.resource_id, "Poll session stopped");
        }
        self.ticker.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start polling `resource_id` every `interval`, delivering results to `sink`.
///
/// Must be called from within a tokio runtime.
pub fn start<F, Fut>(
    resource_id: ResourceId,
    fetch: F,
    interval: Duration,
    sink: Arc<dyn ResultSink>,
) -> PollHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, EndpointError>> + Send + 'static,
{
    let fetch: FetchFn = Arc::new(move || fetch().boxed());
    start_boxed(resource_id, fetch, interval, sink)
}

/// [`start`] with an already boxed fetch function.
pub fn start_boxed(
    resource_id: ResourceId,
    fetch: FetchFn,
    interval: Duration,
    sink: Arc<dyn ResultSink>,
) -> PollHandle {
    let session = Arc::new(PollSession::new(resource_id, interval));
    info!(resource = %resource_id, interval_ms = interval.as_millis() as u64, "Poll session started");

    let ticker = {
        let session = session.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !session.is_active() {
                    break;
                }
                if session.in_flight.swap(true, Ordering::AcqRel) {
                    session.skipped.fetch_add(1, Ordering::Relaxed);
                    trace!(resource = %resource_id, "Previous fetch still in flight, skipping tick");
                    continue;
                }
                session.fetches.fetch_add(1, Ordering::Relaxed);

                let session = session.clone();
                let fetch = fetch.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    let result = fetch().await;
                    session.record(&result);
                    let applied = sink.deliver(resource_id, result, &session.active);
                    if !applied && !session.is_active() {
                        debug!(resource = %resource_id, "Discarding result of stopped session");
                    }
                    session.in_flight.store(false, Ordering::Release);
                });
            }
        })
    };

    PollHandle { session, ticker }
}

/// Stop a session. Same as [`PollHandle::stop`].
pub fn stop(handle: &PollHandle) {
    handle.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DaqStats;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<(ResourceId, bool)>>,
    }

    impl ResultSink for Recorder {
        fn deliver(
            &self,
            resource: ResourceId,
            result: Result<Payload, EndpointError>,
            live: &AtomicBool,
        ) -> bool {
            let mut delivered = self.delivered.lock();
            if !live.load(Ordering::Acquire) {
                return false;
            }
            delivered.push((resource, result.is_ok()));
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_and_cadence_is_fixed() {
        let recorder = Arc::new(Recorder::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = {
            let calls = calls.clone();
            start(
                ResourceId::DaqStats,
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Payload::DaqStats(DaqStats::default())) }
                },
                POLL_INTERVAL,
                recorder.clone(),
            )
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.session().skipped_ticks(), 0);
        assert!(handle.session().last_success_at().is_some());
        assert_eq!(recorder.delivered.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_timer_and_drops_late_result() {
        let recorder = Arc::new(Recorder::default());
        let handle = start(
            ResourceId::Simulator,
            || async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Err(EndpointError::Transport("refused".into()))
            },
            POLL_INTERVAL,
            recorder.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.session().in_flight());
        stop(&handle);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(recorder.delivered.lock().is_empty());
        assert_eq!(handle.session().fetch_count(), 1);
        assert!(!handle.session().in_flight());
        assert!(!handle.session().is_active());
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn failed_poll_is_logged_and_stored() {
        let reconciler = Arc::new(Reconciler::new());
        let _handle = start(
            ResourceId::Deployment,
            || async { Err(EndpointError::Backend("Deployer offline.".into())) },
            POLL_INTERVAL,
            reconciler.clone(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            reconciler.deployment().error.as_deref(),
            Some("Deployer offline.")
        );
        assert!(logs_contain("Resource poll failed"));
    }
}
