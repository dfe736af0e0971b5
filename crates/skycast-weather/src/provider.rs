//! Weather fetcher: one bounded GET per coordinate, mapped to a
//! [`RequestOutcome`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use skycast_core::error::error_chain;
use skycast_core::{NetworkError, ReqwestErrorExt};
use tracing::instrument;

use crate::types::{Coordinate, RequestOutcome, WeatherError, WeatherSnapshot};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Success body as sent by the weather endpoint
#[derive(Debug, Deserialize)]
struct WeatherPayload {
    city: String,
    temp: f64,
    feels_like: f64,
    humidity: f64,
    wind: f64,
    pressure: f64,
    description: String,
    icon: String,
}

impl WeatherPayload {
    fn into_snapshot(self) -> Result<WeatherSnapshot, WeatherError> {
        if self.city.trim().is_empty() {
            return Err(WeatherError::MalformedResponse("empty city".to_string()));
        }
        if self.icon.trim().is_empty() {
            return Err(WeatherError::MalformedResponse("empty icon".to_string()));
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(WeatherError::MalformedResponse(format!(
                "humidity {} out of range",
                self.humidity
            )));
        }

        Ok(WeatherSnapshot {
            city: self.city,
            temperature_c: self.temp,
            feels_like_c: self.feels_like,
            humidity_pct: self.humidity,
            wind_speed: self.wind,
            pressure_hpa: self.pressure,
            description: self.description,
            icon_id: self.icon,
        })
    }
}

/// Error body; `error` is optional
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    endpoint: String,
    timeout: Duration,
}

impl WeatherProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Network(error_chain(&e)))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch current conditions for `coord`. Never retries.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), level = "info")]
    pub async fn fetch(&self, coord: Coordinate) -> RequestOutcome {
        tracing::info!("Fetching weather for {}", coord);

        let outcome = RequestOutcome::from(self.try_fetch(coord).await);
        match &outcome {
            RequestOutcome::Success(snapshot) => {
                tracing::info!("Weather for {}: {:.1}°C", snapshot.city, snapshot.temperature_c);
            }
            RequestOutcome::Failure(e) => {
                tracing::error!(kind = e.kind(), "Failed to fetch weather: {}", e);
            }
        }
        outcome
    }

    async fn try_fetch(&self, coord: Coordinate) -> Result<WeatherSnapshot, WeatherError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", coord.latitude.to_string()),
                ("lon", coord.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let reported = serde_json::from_slice::<ErrorPayload>(&body)
                .ok()
                .and_then(|p| p.error)
                .filter(|msg| !msg.trim().is_empty());

            return Err(match reported {
                Some(msg) => WeatherError::ServerReported(msg),
                None => WeatherError::Network(format!(
                    "Request failed with status code {}",
                    status.as_u16()
                )),
            });
        }

        let payload: WeatherPayload = serde_json::from_slice(&body)
            .map_err(|e| WeatherError::MalformedResponse(e.to_string()))?;
        payload.into_snapshot()
    }
}

fn transport_error(e: reqwest::Error) -> WeatherError {
    match e.into_network_error() {
        NetworkError::Timeout => WeatherError::NetworkTimeout,
        NetworkError::ConnectionFailed(text) => WeatherError::Network(text),
        other => WeatherError::Network(other.to_string()),
    }
}
