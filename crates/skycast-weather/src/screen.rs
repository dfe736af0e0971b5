//! Refresh orchestration for the weather screen.
//!
//! The screen owns all session state. Mount, the refresh button and
//! pull-to-refresh share one path: re-acquire the position, compare it with
//! the last accepted one, fetch only on a significant change. Positions from
//! the watch subscription always fetch.
//!
//! [`WeatherScreen::run`] takes one trigger at a time, so fetches never
//! overlap. Every state change is published on a `watch` channel for the
//! renderer.

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};

use crate::location::{LocationMonitor, MonitorState};
use crate::provider::WeatherProvider;
use crate::types::{Coordinate, RequestOutcome, WeatherError, WeatherSnapshot};

const WATCH_CHANNEL_CAPACITY: usize = 16;

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Mount,
    ManualRefresh,
    PullToRefresh,
}

/// Input from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    PullToRefresh,
    Quit,
}

/// Everything the view needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenState {
    pub last_location: Option<Coordinate>,
    pub snapshot: Option<WeatherSnapshot>,
    pub error: Option<WeatherError>,
    /// Full-screen spinner until the first fetch settles
    pub is_loading: bool,
    /// Pull-to-refresh indicator
    pub is_refreshing: bool,
    pub last_updated: Option<DateTime<Local>>,
    pub monitor: MonitorState,
    /// Weather requests issued this session
    pub fetch_count: u64,
}

pub struct WeatherScreen {
    monitor: LocationMonitor,
    provider: WeatherProvider,
    state: ScreenState,
    view_tx: watch::Sender<ScreenState>,
    position_tx: mpsc::Sender<Coordinate>,
    position_rx: mpsc::Receiver<Coordinate>,
}

impl WeatherScreen {
    pub fn new(monitor: LocationMonitor, provider: WeatherProvider) -> Self {
        let state = ScreenState::default();
        let (view_tx, _) = watch::channel(state.clone());
        let (position_tx, position_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        Self {
            monitor,
            provider,
            state,
            view_tx,
            position_tx,
            position_rx,
        }
    }

    /// Receive every published state
    pub fn subscribe(&self) -> watch::Receiver<ScreenState> {
        self.view_tx.subscribe()
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    /// Initial load, then start the watch subscription
    pub async fn mount(&mut self) {
        self.state.is_loading = true;
        self.publish();

        self.refresh(Trigger::Mount).await;

        match self.monitor.watch(self.position_tx.clone()).await {
            Ok(()) => {}
            Err(e) => tracing::warn!("Location watch not started: {}", e),
        }
        self.state.monitor = self.monitor.state();
        self.publish();
    }

    /// Re-acquire the position and fetch if it moved significantly
    pub async fn refresh(&mut self, trigger: Trigger) {
        tracing::info!(?trigger, "Refresh requested");
        self.state.is_refreshing = true;
        self.publish();

        let position = match self.monitor.acquire_initial().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Could not get location: {}", e);
                self.state.error = Some(e.into());
                self.settle();
                return;
            }
        };

        if self.monitor.is_significant(self.state.last_location, position) {
            tracing::info!("New location detected: {}", position);
            self.state.last_location = Some(position);
            self.fetch_and_apply(position).await;
        } else {
            tracing::info!("Location unchanged");
            self.settle();
        }
    }

    /// A position reported by the watch subscription. Always fetches.
    pub async fn on_position_update(&mut self, position: Coordinate) {
        tracing::info!("Location change reported: {}", position);
        self.state.last_location = Some(position);
        self.fetch_and_apply(position).await;
    }

    /// Release the location subscription
    pub fn teardown(&mut self) {
        self.monitor.cancel();
        self.state.monitor = self.monitor.state();
        self.publish();
    }

    /// Mount, serve commands and watch updates until `Quit` or the command
    /// channel closes, then tear down. Returns the final state.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> ScreenState {
        self.mount().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Refresh) => self.refresh(Trigger::ManualRefresh).await,
                    Some(Command::PullToRefresh) => self.refresh(Trigger::PullToRefresh).await,
                    Some(Command::Quit) | None => break,
                },
                Some(position) = self.position_rx.recv() => {
                    self.on_position_update(position).await;
                }
            }
        }

        self.teardown();
        tracing::info!("Weather screen closed");
        self.state
    }

    async fn fetch_and_apply(&mut self, position: Coordinate) {
        self.state.fetch_count += 1;

        match self.provider.fetch(position).await {
            RequestOutcome::Success(snapshot) => {
                self.state.snapshot = Some(snapshot);
                self.state.error = None;
                self.state.last_updated = Some(Local::now());
            }
            RequestOutcome::Failure(e) => {
                self.state.error = Some(e);
            }
        }

        self.settle();
    }

    /// Clear both progress flags and publish. Runs after every trigger.
    fn settle(&mut self) {
        self.state.is_loading = false;
        self.state.is_refreshing = false;
        self.state.monitor = self.monitor.state();
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.state.clone());
    }
}
