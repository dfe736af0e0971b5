/// Message shown when a failure carries no usable text of its own
pub const FALLBACK_ERROR_MESSAGE: &str = "Failed to load weather data";

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Current conditions for one location, replaced wholesale on every fetch
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub city: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: f64,
    pub wind_speed: f64,
    pub pressure_hpa: f64,
    pub description: String,
    pub icon_id: String,
}

impl WeatherSnapshot {
    /// Temperature rounded to whole degrees, e.g. `25°C`
    pub fn temperature_display(&self) -> String {
        format!("{}°C", round_half_up(self.temperature_c))
    }

    pub fn feels_like_display(&self) -> String {
        format!("{}°C", round_half_up(self.feels_like_c))
    }

    /// Description with its first letter capitalized
    pub fn description_display(&self) -> String {
        let mut chars = self.description.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Fill `{icon}` in `template` with this snapshot's icon id
    pub fn icon_url(&self, template: &str) -> String {
        template.replace("{icon}", &self.icon_id)
    }
}

/// Round to the nearest integer, halves toward positive infinity
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Location service errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable: {0}")]
    Unavailable(String),
    #[error("Location request timed out")]
    Timeout,
}

/// Everything that can keep weather off the screen
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeatherError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Unable to get location: {0}")]
    LocationUnavailable(String),
    #[error("Request timed out")]
    NetworkTimeout,
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    ServerReported(String),
    #[error("Malformed weather response: {0}")]
    MalformedResponse(String),
}

impl WeatherError {
    /// Human-readable text for the error view
    pub fn message(&self) -> String {
        let text = self.to_string();
        if text.trim().is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            text
        }
    }

    /// Stable identifier for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::LocationUnavailable(_) => "location_unavailable",
            Self::NetworkTimeout => "network_timeout",
            Self::Network(_) => "network_error",
            Self::ServerReported(_) => "server_reported",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<LocationError> for WeatherError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::PermissionDenied => Self::PermissionDenied,
            LocationError::Unavailable(reason) => Self::LocationUnavailable(reason),
            LocationError::Timeout => {
                Self::LocationUnavailable("timed out waiting for a position fix".to_string())
            }
        }
    }
}

/// Result of one weather request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Success(WeatherSnapshot),
    Failure(WeatherError),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure text, `None` on success
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e.message()),
        }
    }
}

impl From<Result<WeatherSnapshot, WeatherError>> for RequestOutcome {
    fn from(result: Result<WeatherSnapshot, WeatherError>) -> Self {
        match result {
            Ok(snapshot) => Self::Success(snapshot),
            Err(e) => Self::Failure(e),
        }
    }
}
