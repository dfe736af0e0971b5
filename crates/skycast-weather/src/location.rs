//! Location monitoring: initial acquisition, the significance filter and the
//! standing watch subscription.
//!
//! Positions come from a [`PositionSource`]. The monitor never talks to a
//! device directly, so tests and hosts can plug in their own source.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::types::{Coordinate, LocationError};

/// Degrees of latitude or longitude a position must move to count as new
pub const SIGNIFICANCE_THRESHOLD_DEGREES: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    Balanced,
    #[default]
    High,
}

/// Reporting policy for a standing subscription.
///
/// Enforced by the source, not by the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    pub min_interval: Duration,
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            min_interval: Duration::from_secs(30),
            min_distance_meters: 500.0,
        }
    }
}

/// A device (or stand-in) location service
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Ask for foreground location permission
    async fn request_permission(&self) -> PermissionStatus;

    /// One-shot position fix
    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinate, LocationError>;

    /// Start a standing subscription.
    ///
    /// Qualifying positions are sent on `tx` until `cancel` fires or the
    /// receiver is dropped.
    fn watch(&self, options: WatchOptions, tx: mpsc::Sender<Coordinate>, cancel: CancellationToken);
}

/// True when `current` is far enough from `previous` to warrant a fetch.
///
/// Always true without a previous position.
pub fn is_significant_change(previous: Option<Coordinate>, current: Coordinate) -> bool {
    is_significant_change_with(previous, current, SIGNIFICANCE_THRESHOLD_DEGREES)
}

pub fn is_significant_change_with(
    previous: Option<Coordinate>,
    current: Coordinate,
    threshold_degrees: f64,
) -> bool {
    match previous {
        None => true,
        Some(prev) => {
            (current.latitude - prev.latitude).abs() > threshold_degrees
                || (current.longitude - prev.longitude).abs() > threshold_degrees
        }
    }
}

/// Lifecycle of the monitor within one screen session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Unstarted,
    Watching,
    Cancelled,
    /// Permission was denied; no subscription for the rest of the session
    Errored,
}

/// Releases a watch subscription when cancelled or dropped
#[derive(Debug)]
pub struct WatchHandle {
    token: CancellationToken,
}

impl WatchHandle {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop the subscription. Safe to call more than once.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Cancelling location watch");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct LocationMonitor {
    source: Arc<dyn PositionSource>,
    options: WatchOptions,
    threshold_degrees: f64,
    state: MonitorState,
    handle: Option<WatchHandle>,
}

impl LocationMonitor {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self {
            source,
            options: WatchOptions::default(),
            threshold_degrees: SIGNIFICANCE_THRESHOLD_DEGREES,
            state: MonitorState::Unstarted,
            handle: None,
        }
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_threshold(mut self, degrees: f64) -> Self {
        self.threshold_degrees = degrees;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Request permission, then a high-accuracy fix.
    ///
    /// A denial before the watch has started moves the monitor to
    /// [`MonitorState::Errored`].
    pub async fn acquire_initial(&mut self) -> Result<Coordinate, LocationError> {
        if self.source.request_permission().await == PermissionStatus::Denied {
            tracing::warn!("Location permission denied");
            if self.state == MonitorState::Unstarted {
                self.state = MonitorState::Errored;
            }
            return Err(LocationError::PermissionDenied);
        }

        let position = self.source.current_position(Accuracy::High).await?;
        tracing::info!("Got location: {}", position);
        Ok(position)
    }

    pub fn is_significant(&self, previous: Option<Coordinate>, current: Coordinate) -> bool {
        is_significant_change_with(previous, current, self.threshold_degrees)
    }

    /// Start the standing subscription, delivering positions on `tx`.
    ///
    /// Does nothing if already watching. Fails once the session has errored
    /// or been cancelled.
    pub async fn watch(&mut self, tx: mpsc::Sender<Coordinate>) -> Result<(), LocationError> {
        match self.state {
            MonitorState::Watching => return Ok(()),
            MonitorState::Errored => return Err(LocationError::PermissionDenied),
            MonitorState::Cancelled => {
                return Err(LocationError::Unavailable("monitor was cancelled".to_string()))
            }
            MonitorState::Unstarted => {}
        }

        if self.source.request_permission().await == PermissionStatus::Denied {
            self.state = MonitorState::Errored;
            return Err(LocationError::PermissionDenied);
        }

        let token = CancellationToken::new();
        self.source.watch(self.options, tx, token.clone());
        self.handle = Some(WatchHandle::new(token));
        self.state = MonitorState::Watching;

        tracing::info!(
            "Watching location (interval {:?}, distance {} m)",
            self.options.min_interval,
            self.options.min_distance_meters
        );
        Ok(())
    }

    /// Release the subscription. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
            self.state = MonitorState::Cancelled;
        }
    }
}

/// Poll `fix` on `options.min_interval` and report positions that moved at
/// least `options.min_distance_meters` from the last reported one.
///
/// The first successful fix becomes the baseline and is not reported.
pub async fn poll_positions<F, Fut>(
    options: WatchOptions,
    tx: mpsc::Sender<Coordinate>,
    cancel: CancellationToken,
    mut fix: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Coordinate, LocationError>>,
{
    // tokio::time::interval panics on a zero period
    let period = options.min_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_reported: Option<Coordinate> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fix() => result,
        };

        let position = match result {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Watch poll failed: {}", e);
                continue;
            }
        };

        match last_reported {
            None => {
                tracing::debug!("Watch baseline at {}", position);
                last_reported = Some(position);
            }
            Some(prev) if prev.distance_meters(&position) >= options.min_distance_meters => {
                tracing::debug!("Watch reporting {}", position);
                last_reported = Some(position);
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(position) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            Some(_) => {
                tracing::trace!("Watch ignoring {} (below distance)", position);
            }
        }
    }

    tracing::debug!("Location watch stopped");
}
