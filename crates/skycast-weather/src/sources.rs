//! Concrete position sources.
//!
//! - [`FixedSource`]: a configured coordinate that never moves
//! - [`IpLocator`]: coarse IP geolocation over HTTP, polled for the watch
//! - [`ChannelSource`]: fixes pushed in by a host platform

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use skycast_core::{NetworkError, ReqwestErrorExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::location::{poll_positions, Accuracy, PermissionStatus, PositionSource, WatchOptions};
use crate::types::{Coordinate, LocationError};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("SkyCast/", env!("CARGO_PKG_VERSION"));

/// A position that never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedSource {
    position: Coordinate,
}

impl FixedSource {
    pub fn new(position: Coordinate) -> Self {
        Self { position }
    }
}

#[async_trait]
impl PositionSource for FixedSource {
    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<Coordinate, LocationError> {
        Ok(self.position)
    }

    fn watch(&self, _options: WatchOptions, tx: mpsc::Sender<Coordinate>, cancel: CancellationToken) {
        // Nothing ever moves; hold the sender so the subscription stays open.
        tokio::spawn(async move {
            cancel.cancelled().await;
            drop(tx);
        });
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: Option<String>,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// IP geolocation (ip-api.com compatible: `{"status", "lat", "lon"}`)
#[derive(Debug, Clone)]
pub struct IpLocator {
    client: Arc<Client>,
    url: String,
}

impl IpLocator {
    pub fn new(url: impl Into<String>) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            url: url.into(),
        })
    }

    async fn lookup(&self) -> Result<Coordinate, LocationError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(lookup_error)?;

        if !response.status().is_success() {
            return Err(LocationError::Unavailable(format!(
                "IP lookup returned status {}",
                response.status()
            )));
        }

        let body: IpLookupResponse = response.json().await.map_err(lookup_error)?;

        if body.status.as_deref() == Some("fail") {
            return Err(LocationError::Unavailable(
                body.message
                    .unwrap_or_else(|| "IP lookup failed".to_string()),
            ));
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
            _ => Err(LocationError::Unavailable(
                "IP lookup response has no coordinates".to_string(),
            )),
        }
    }
}

fn lookup_error(e: reqwest::Error) -> LocationError {
    match e.into_network_error() {
        NetworkError::Timeout => LocationError::Timeout,
        other => LocationError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl PositionSource for IpLocator {
    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinate, LocationError> {
        if accuracy == Accuracy::High {
            tracing::debug!("IP geolocation is city-level; high accuracy not available");
        }
        self.lookup().await
    }

    fn watch(&self, options: WatchOptions, tx: mpsc::Sender<Coordinate>, cancel: CancellationToken) {
        let locator = self.clone();
        tokio::spawn(poll_positions(options, tx, cancel, move || {
            let locator = locator.clone();
            async move { locator.lookup().await }
        }));
    }
}

struct Subscriber {
    tx: mpsc::Sender<Coordinate>,
    cancel: CancellationToken,
}

/// Source fed by the host.
///
/// The host owns the platform location service, applies its own
/// interval/distance policy and pushes qualifying fixes with
/// [`ChannelSource::push_update`].
pub struct ChannelSource {
    permission: Mutex<PermissionStatus>,
    current: Mutex<Option<Coordinate>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChannelSource {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            permission: Mutex::new(permission),
            current: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *self.permission.lock() = status;
    }

    /// Set the fix answered by one-shot requests without notifying watchers
    pub fn set_position(&self, position: Coordinate) {
        *self.current.lock() = Some(position);
    }

    /// Record a new fix and deliver it to every live subscription.
    ///
    /// Returns the number of subscriptions that received it.
    pub async fn push_update(&self, position: Coordinate) -> usize {
        self.set_position(position);

        let targets: Vec<mpsc::Sender<Coordinate>> = {
            let mut subs = self.subscribers.lock();
            subs.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
            subs.iter().map(|s| s.tx.clone()).collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(position).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of subscriptions not yet cancelled
    pub fn active_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| !s.cancel.is_cancelled())
            .count()
    }
}

#[async_trait]
impl PositionSource for ChannelSource {
    async fn request_permission(&self) -> PermissionStatus {
        *self.permission.lock()
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<Coordinate, LocationError> {
        let current = *self.current.lock();
        current.ok_or_else(|| LocationError::Unavailable("no position fix yet".to_string()))
    }

    fn watch(&self, _options: WatchOptions, tx: mpsc::Sender<Coordinate>, cancel: CancellationToken) {
        self.subscribers.lock().push(Subscriber { tx, cancel });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fixed_source_returns_configured_position() {
        let source = FixedSource::new(Coordinate::new(-22.9, -43.2));
        assert_eq!(source.request_permission().await, PermissionStatus::Granted);
        assert_eq!(
            source.current_position(Accuracy::High).await.unwrap(),
            Coordinate::new(-22.9, -43.2)
        );
    }

    #[tokio::test]
    async fn test_fixed_source_watch_closes_on_cancel() {
        let source = FixedSource::new(Coordinate::new(0.0, 0.0));
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        source.watch(WatchOptions::default(), tx, cancel.clone());

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_ip_locator_parses_coordinates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "city": "Rio de Janeiro",
                "lat": -22.9068,
                "lon": -43.1729
            })))
            .mount(&mock_server)
            .await;

        let locator = IpLocator::new(format!("{}/json", mock_server.uri())).unwrap();
        let position = locator.current_position(Accuracy::High).await.unwrap();

        assert_eq!(position, Coordinate::new(-22.9068, -43.1729));
    }

    #[tokio::test]
    async fn test_ip_locator_reports_lookup_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "reserved range"
            })))
            .mount(&mock_server)
            .await;

        let locator = IpLocator::new(format!("{}/json", mock_server.uri())).unwrap();
        let err = locator.current_position(Accuracy::High).await.unwrap_err();

        assert_eq!(err, LocationError::Unavailable("reserved range".into()));
    }

    #[tokio::test]
    async fn test_ip_locator_http_error_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let locator = IpLocator::new(mock_server.uri()).unwrap();
        let err = locator.current_position(Accuracy::High).await.unwrap_err();

        assert!(matches!(err, LocationError::Unavailable(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_channel_source_without_fix_is_unavailable() {
        let source = ChannelSource::new(PermissionStatus::Granted);
        let err = source.current_position(Accuracy::High).await.unwrap_err();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_channel_source_delivers_to_live_subscribers() {
        let source = ChannelSource::new(PermissionStatus::Granted);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        source.watch(WatchOptions::default(), tx, cancel.clone());
        assert_eq!(source.active_subscriptions(), 1);

        let delivered = source.push_update(Coordinate::new(1.0, 2.0)).await;
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await, Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(
            source.current_position(Accuracy::High).await.unwrap(),
            Coordinate::new(1.0, 2.0)
        );

        cancel.cancel();
        assert_eq!(source.active_subscriptions(), 0);
        assert_eq!(source.push_update(Coordinate::new(3.0, 4.0)).await, 0);
    }

    #[tokio::test]
    async fn test_channel_source_permission_toggle() {
        let source = ChannelSource::new(PermissionStatus::Denied);
        assert_eq!(source.request_permission().await, PermissionStatus::Denied);
        source.set_permission(PermissionStatus::Granted);
        assert_eq!(source.request_permission().await, PermissionStatus::Granted);
    }
}
