//! Plain-text rendering of screen state.

use std::fmt::Write;

use meteo_core::{PlaceCandidate, ScreenState, TimeSeries, WeatherSnapshot, describe_value};

/// The three views of the weather screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Currently,
    Today,
    Weekly,
}

impl Tab {
    pub const fn all() -> &'static [Tab] {
        &[Tab::Currently, Tab::Today, Tab::Weekly]
    }

    fn title(self) -> &'static str {
        match self {
            Tab::Currently => "Currently",
            Tab::Today => "Today",
            Tab::Weekly => "Weekly",
        }
    }
}

/// One line per search result.
pub fn place_line(place: &PlaceCandidate) -> String {
    format!("{} ({})", place.label(), place.coordinates())
}

pub fn render_tabs(tabs: &[Tab], state: &ScreenState) -> String {
    let mut out = String::new();
    let heading = if state.address.is_empty() {
        state.coords.to_string()
    } else {
        state.address.clone()
    };
    let _ = writeln!(out, "{heading}");

    let Some(snapshot) = state.snapshot.as_deref() else {
        match &state.last_error {
            Some(err) => {
                let _ = writeln!(out, "No weather data: {err}");
            }
            None => {
                let _ = writeln!(out, "No weather data yet.");
            }
        }
        return out;
    };

    if let Some(err) = &state.last_error {
        let _ = writeln!(out, "(showing previous data, refresh failed: {err})");
    }

    for tab in tabs {
        let _ = writeln!(out, "\n== {} ==", tab.title());
        match tab {
            Tab::Currently => currently(&mut out, snapshot),
            Tab::Today => today(&mut out, &snapshot.hourly),
            Tab::Weekly => weekly(&mut out, &snapshot.daily),
        }
    }
    out
}

fn condition(code: Option<f64>) -> String {
    match code {
        None => "-".to_string(),
        Some(code) => describe_value(code).map_or_else(|| format!("code {code}"), str::to_string),
    }
}

fn temperature(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}°C"))
}

fn wind(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}km/h"))
}

fn currently(out: &mut String, snapshot: &WeatherSnapshot) {
    let current = &snapshot.current;
    let _ = writeln!(out, "{}", condition(current.scalar("weather_code")));
    let _ = writeln!(out, "Temperature: {}", temperature(current.scalar("temperature_2m")));
    let _ = writeln!(out, "Wind: {}", wind(current.scalar("wind_speed_10m")));
}

fn today(out: &mut String, hourly: &TimeSeries) {
    let Some(first) = hourly.time.first() else {
        let _ = writeln!(out, "-");
        return;
    };
    let day = first.date_naive();

    for (i, t) in hourly.time.iter().enumerate().take_while(|(_, t)| t.date_naive() == day) {
        let _ = writeln!(
            out,
            "{}  {:>8}  {:>9}  {}",
            t.format("%H:%M"),
            temperature(hourly.value_at("temperature_2m", i)),
            wind(hourly.value_at("wind_speed_10m", i)),
            condition(hourly.value_at("weather_code", i)),
        );
    }
}

fn weekly(out: &mut String, daily: &TimeSeries) {
    if daily.is_empty() {
        let _ = writeln!(out, "-");
        return;
    }

    for (i, t) in daily.time.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}  {:>8} / {:>8}  {:>9}  {}",
            t.format("%Y-%m-%d"),
            temperature(daily.value_at("temperature_2m_min", i)),
            temperature(daily.value_at("temperature_2m_max", i)),
            wind(daily.value_at("wind_speed_10m_max", i)),
            condition(daily.value_at("weather_code", i)),
        );
    }
}

/// Spread of the members of `key` at step `index`, NaNs skipped.
fn member_stats(series: &TimeSeries, key: &str, index: usize) -> Option<(usize, f64, f64, f64)> {
    let values: Vec<f64> = series
        .members(key)
        .into_iter()
        .filter_map(|(_, values)| values.get(index).copied())
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((values.len(), min, mean, max))
}

fn ensemble_tier(out: &mut String, title: &str, series: &TimeSeries, keys: &[String]) {
    let Some(first) = series.time.first() else {
        return;
    };
    let _ = writeln!(out, "\n== {title} ({}) ==", first.format("%Y-%m-%d %H:%M"));

    for key in keys {
        match member_stats(series, key, 0) {
            Some((n, min, mean, max)) => {
                let _ = writeln!(out, "{key}: {n} members, min {min:.1} / mean {mean:.1} / max {max:.1}");
            }
            None => {
                let _ = writeln!(out, "{key}: -");
            }
        }
    }
}

/// First-step member spread for every requested ensemble variable.
pub fn render_ensemble(snapshot: &WeatherSnapshot, hourly: &[String], daily: &[String]) -> String {
    let mut out = String::new();
    ensemble_tier(&mut out, "Hourly", &snapshot.hourly, hourly);
    ensemble_tier(&mut out, "Daily", &snapshot.daily, daily);
    if out.is_empty() {
        out.push_str("No ensemble data.");
    }
    out
}
