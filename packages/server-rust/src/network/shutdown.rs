//! Graceful shutdown controller with in-flight RPC tracking.
//!
//! Health state lives in an `ArcSwap` so probes read it without locking.
//! In-flight top-ups are counted by RAII guards; the last guard to drop
//! while draining wakes the drain waiter through a `Notify`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Server is initializing (not yet accepting top-ups).
    Starting,
    /// Server is fully operational.
    Ready,
    /// Server is draining in-flight top-ups; new ones are refused.
    Draining,
    /// Server has fully stopped.
    Stopped,
}

impl HealthState {
    /// Lowercase name reported by the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Controls graceful shutdown with health state management and in-flight tracking.
///
/// 1. Health probes read `health_state()` to report readiness
/// 2. The RPC handler refuses new top-ups unless `is_accepting()`
/// 3. `trigger_shutdown()` moves to Draining and signals all listeners
/// 4. `wait_for_drain()` resolves once every in-flight top-up has finished
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(InFlight::default()),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
        tracing::info!("server ready");
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and signals all shutdown receivers. Idempotent.
    pub fn trigger_shutdown(&self) {
        if matches!(
            self.health_state(),
            HealthState::Draining | HealthState::Stopped
        ) {
            return;
        }
        self.health_state.store(Arc::new(HealthState::Draining));
        tracing::info!(in_flight = self.in_flight_count(), "draining top-ups");
        // Receivers may have been dropped.
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Whether new top-ups should be admitted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.health_state() == HealthState::Ready
    }

    /// Creates an RAII guard that tracks one in-flight top-up.
    ///
    /// The counter is decremented when the guard drops, including during
    /// unwinding or cancellation of the handler future.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Admits one top-up, or `None` unless the server is `Ready`.
    ///
    /// The guard is taken before the state is read, so a drain that starts
    /// concurrently either sees this call in flight or the call is refused.
    #[must_use]
    pub fn admit(&self) -> Option<InFlightGuard> {
        let guard = self.in_flight_guard();
        self.is_accepting().then_some(guard)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits for all in-flight top-ups to complete, up to `timeout`.
    ///
    /// Returns `true` and transitions to `Stopped` if the count reached
    /// zero; returns `false` and stays `Draining` if the timeout expired.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let idle = self.in_flight.idle.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.health_state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
