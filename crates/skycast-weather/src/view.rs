//! Text rendering of [`ScreenState`].

use crate::screen::ScreenState;
use crate::types::WeatherSnapshot;

pub const LOADING_TEXT: &str = "Fetching weather data...";
pub const RETRY_HINT: &str = "Pull to refresh to try again";
pub const REFRESHING_TEXT: &str = "Refreshing...";
pub const EMPTY_TEXT: &str = "No weather data yet. Pull to refresh.";

/// Render the screen as plain text lines.
///
/// Precedence: loading spinner, then error view, then weather.
pub fn render(state: &ScreenState, icon_url_template: &str) -> String {
    if state.is_loading {
        return LOADING_TEXT.to_string();
    }

    let mut lines = Vec::new();

    if state.is_refreshing {
        lines.push(REFRESHING_TEXT.to_string());
    }

    if let Some(error) = &state.error {
        lines.push(format!("Error: {}", error.message()));
        lines.push(RETRY_HINT.to_string());
    } else if let Some(snapshot) = &state.snapshot {
        render_snapshot(&mut lines, snapshot, icon_url_template);
        if let Some(updated) = state.last_updated {
            lines.push(String::new());
            lines.push(format!("Last updated: {}", updated.format("%H:%M:%S")));
        }
    } else {
        lines.push(EMPTY_TEXT.to_string());
    }

    lines.join("\n")
}

fn render_snapshot(lines: &mut Vec<String>, snapshot: &WeatherSnapshot, icon_url_template: &str) {
    lines.push(format!("{}  [r] refresh", snapshot.city));
    lines.push(format!("Icon: {}", snapshot.icon_url(icon_url_template)));
    lines.push(String::new());
    lines.push(snapshot.temperature_display());
    lines.push(snapshot.description_display());
    lines.push(String::new());
    lines.push(detail_row(
        ("Feels like", snapshot.feels_like_display()),
        ("Humidity", format!("{}%", snapshot.humidity_pct)),
    ));
    lines.push(detail_row(
        ("Wind", format!("{} m/s", snapshot.wind_speed)),
        ("Pressure", format!("{} hPa", snapshot.pressure_hpa)),
    ));
}

fn detail_row(left: (&str, String), right: (&str, String)) -> String {
    format!("{:<12}{:>10}    {:<12}{:>10}", left.0, left.1, right.0, right.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeatherError;
    use chrono::{Local, TimeZone};

    const ICON_TEMPLATE: &str = "https://openweathermap.org/img/wn/{icon}@4x.png";

    fn rio() -> WeatherSnapshot {
        WeatherSnapshot {
            city: "Rio".into(),
            temperature_c: 25.3,
            feels_like_c: 26.8,
            humidity_pct: 78.0,
            wind_speed: 3.6,
            pressure_hpa: 1012.0,
            description: "scattered clouds".into(),
            icon_id: "03d".into(),
        }
    }

    #[test]
    fn test_render_loading_state() {
        let state = ScreenState {
            is_loading: true,
            snapshot: Some(rio()),
            ..Default::default()
        };

        assert_eq!(render(&state, ICON_TEMPLATE), LOADING_TEXT);
    }

    #[test]
    fn test_render_weather() {
        let state = ScreenState {
            snapshot: Some(rio()),
            last_updated: Local.with_ymd_and_hms(2026, 10, 17, 14, 5, 9).single(),
            ..Default::default()
        };

        let output = render(&state, ICON_TEMPLATE);

        assert!(output.contains("Rio"), "Should show city");
        assert!(output.contains("25°C"), "Should show rounded temperature");
        assert!(output.contains("Scattered clouds"), "Should capitalize description");
        assert!(output.contains("https://openweathermap.org/img/wn/03d@4x.png"));
        assert!(output.contains("27°C"), "Should show feels like");
        assert!(output.contains("78%"));
        assert!(output.contains("3.6 m/s"));
        assert!(output.contains("1012 hPa"));
        assert!(output.contains("Last updated: 14:05:09"));
        assert!(!output.contains(REFRESHING_TEXT));
    }

    #[test]
    fn test_render_error_hides_snapshot() {
        let state = ScreenState {
            snapshot: Some(rio()),
            error: Some(WeatherError::NetworkTimeout),
            ..Default::default()
        };

        let output = render(&state, ICON_TEMPLATE);

        assert!(output.contains("Error: Request timed out"));
        assert!(output.contains(RETRY_HINT), "Should show retry hint");
        assert!(!output.contains("Rio"));
    }

    #[test]
    fn test_render_permission_denied() {
        let state = ScreenState {
            error: Some(WeatherError::PermissionDenied),
            ..Default::default()
        };

        let output = render(&state, ICON_TEMPLATE);
        assert!(output.contains("Location permission denied"));
    }

    #[test]
    fn test_render_refreshing_indicator() {
        let state = ScreenState {
            snapshot: Some(rio()),
            is_refreshing: true,
            ..Default::default()
        };

        let output = render(&state, ICON_TEMPLATE);
        assert!(output.starts_with(REFRESHING_TEXT));
        assert!(output.contains("25°C"));
    }

    #[test]
    fn test_render_empty_state() {
        let output = render(&ScreenState::default(), ICON_TEMPLATE);
        assert_eq!(output, EMPTY_TEXT);
    }
}
