//! WMO weather interpretation codes as reported in `weather_code` columns.

/// Full WMO 4677 wording for the subset Open-Meteo reports.
pub fn describe_code(code: i32) -> Option<&'static str> {
    let text = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => return None,
    };
    Some(text)
}

/// Codes arrive as floats in columnar data; NaN and fractional values are unknown.
pub fn describe_value(value: f64) -> Option<&'static str> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    describe_code(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reported_code_has_text() {
        let codes = [
            0, 1, 2, 3, 45, 48, 51, 53, 55, 56, 57, 61, 63, 65, 66, 67, 71, 73, 75, 77, 80, 81, 82, 85, 86, 95, 96, 99,
        ];
        for code in codes {
            assert!(describe_code(code).is_some(), "code {code}");
        }
    }

    #[test]
    fn unassigned_codes_have_none() {
        for code in [-1, 4, 50, 98, 100] {
            assert_eq!(describe_code(code), None);
        }
    }

    #[test]
    fn wording() {
        assert_eq!(describe_code(3), Some("Overcast"));
        assert_eq!(describe_code(66), Some("Light freezing rain"));
        assert_eq!(describe_code(96), Some("Thunderstorm with slight hail"));
    }

    #[test]
    fn float_values() {
        assert_eq!(describe_value(61.0), Some("Slight rain"));
        assert_eq!(describe_value(61.5), None);
        assert_eq!(describe_value(f64::NAN), None);
        assert_eq!(describe_value(f64::INFINITY), None);
    }
}
